// Location text normalization and splitting.
//
// Purpose
// - Two strings name the same place when their normalized forms are equal.
//
// Responsibilities
// - Lower-case, drop punctuation and collapse whitespace.
// - Fold known abbreviation pairs: `conference`/`conf`, `floor`/`flr`/`fl`, `building`/`bldg`,
//   `rm`/`room`, and `room N`/`N`.

fn canonical_token(token: &str) -> &str {
    match token {
        "conference" => "conf",
        "floor" | "flr" => "fl",
        "building" | "bld" => "bldg",
        "rm" => "room",
        other => other,
    }
}

fn is_numeric_token(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = cleaned.split_whitespace().map(canonical_token).collect();
    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
    for (index, token) in tokens.iter().enumerate() {
        let next_is_number = tokens.get(index + 1).is_some_and(|next| is_numeric_token(next));
        if *token == "room" && next_is_number {
            continue;
        }
        kept.push(token);
    }
    kept.join(" ")
}

/// Splits a multi-location string on `,` and `;`. Segments are trimmed and empty ones dropped.
pub fn split_segments(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
