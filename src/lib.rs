pub mod shared {
    pub mod core {
        pub mod errors;
        pub mod primitives;
    }
    pub mod infrastructure {
        pub mod progress;
        pub mod record_store;
        pub mod retry;
    }
}

pub mod modules {
    pub mod events {
        pub mod core {
            pub mod events;
            pub mod evolve;
            pub mod state;
        }
        pub mod use_cases {
            pub mod lifecycle {
                pub mod commands;
                pub mod decide;
                pub mod decision;
                pub mod handler;
            }
            pub mod list_events {
                pub mod handler;
            }
        }
        pub mod adapters {
            pub mod inbound {
                pub mod graphql;
                pub mod http;
            }
            pub mod outbound {
                pub mod change_listener;
                pub mod event_records;
                pub mod event_records_in_memory;
            }
        }
    }
    pub mod locations {
        pub mod core {
            pub mod location;
            pub mod normalize;
            pub mod resolver;
            pub mod usage;
        }
        pub mod use_cases {
            pub mod assign_string;
            pub mod delete_location;
            pub mod handler;
            pub mod merge_locations;
            pub mod registry;
        }
        pub mod adapters {
            pub mod inbound {
                pub mod graphql;
                pub mod http;
            }
            pub mod outbound {
                pub mod location_store;
                pub mod location_store_in_memory;
            }
        }
    }
    pub mod sync {
        pub mod core {
            pub mod external_fields;
        }
        pub mod use_cases {
            pub mod reconcile {
                pub mod handler;
                pub mod report;
            }
            pub mod load_events {
                pub mod cache;
                pub mod handler;
            }
        }
        pub mod adapters {
            pub mod inbound {
                pub mod http;
            }
            pub mod outbound {
                pub mod calendar_source;
                pub mod calendar_source_in_memory;
            }
        }
    }
}

pub mod shell;
