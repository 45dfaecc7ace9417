use percent_encoding::percent_decode_str;

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Decodes `%XX` escapes and `+` (as space) the way HTML form decoding does.
///
/// Malformed escapes are kept verbatim and invalid UTF-8 sequences are
/// replaced, so decoding never fails.
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(&input.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Best-effort integer parse for geometry attributes.
///
/// Decimals truncate toward zero, a leading numeric prefix such as `12px`
/// yields `12`, and anything unparseable yields `0`. Results are clamped to
/// the `i32` range.
pub fn parse_coordinate(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }

    if let Ok(value) = trimmed.parse::<i64>() {
        return value.clamp(COORDINATE_MIN, COORDINATE_MAX);
    }

    if let Ok(value) = trimmed.parse::<f64>() {
        return clamp_float(value);
    }

    let prefix_len = trimmed
        .char_indices()
        .take_while(|&(idx, ch)| {
            ch.is_ascii_digit() || ch == '.' || (idx == 0 && (ch == '-' || ch == '+'))
        })
        .map(|(idx, ch)| idx + ch.len_utf8())
        .last()
        .unwrap_or(0);

    trimmed[..prefix_len]
        .parse::<f64>()
        .ok()
        .map(clamp_float)
        .unwrap_or(0)
}

const COORDINATE_MIN: i64 = i32::MIN as i64;
const COORDINATE_MAX: i64 = i32::MAX as i64;

fn clamp_float(value: f64) -> i64 {
    if value.is_finite() {
        (value.trunc() as i64).clamp(COORDINATE_MIN, COORDINATE_MAX)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_attribute_values() {
        assert_eq!(
            escape_xml(r#"a&b<"c">'d'"#),
            "a&amp;b&lt;&quot;c&quot;&gt;&apos;d&apos;"
        );
    }

    #[test]
    fn percent_decoding_handles_form_encoding() {
        assert_eq!(percent_decode("%3Cmxfile%20host%3D%22x%22%3E"), "<mxfile host=\"x\">");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%C3%A9"), "é");
        assert_eq!(percent_decode("%FF"), "\u{FFFD}");
    }

    #[test]
    fn coordinates_parse_best_effort() {
        assert_eq!(parse_coordinate("42"), 42);
        assert_eq!(parse_coordinate(" -7 "), -7);
        assert_eq!(parse_coordinate("12.9"), 12);
        assert_eq!(parse_coordinate("-0.5"), 0);
        assert_eq!(parse_coordinate("15px"), 15);
        assert_eq!(parse_coordinate("abc"), 0);
        assert_eq!(parse_coordinate(""), 0);
        assert_eq!(parse_coordinate("-"), 0);
    }

    #[test]
    fn huge_coordinates_are_clamped() {
        assert_eq!(parse_coordinate("1e30"), i64::from(i32::MAX));
        assert_eq!(parse_coordinate("-1e30"), i64::from(i32::MIN));
        assert_eq!(parse_coordinate("9223372036854775807"), i64::from(i32::MAX));
        assert_eq!(parse_coordinate("99999999999px"), i64::from(i32::MAX));
        assert_eq!(parse_coordinate("NaN"), 0);
    }
}
