use etl_types::EtlError;
use regex::Regex;
use std::sync::OnceLock;

static LEADING_NOISE: OnceLock<Regex> = OnceLock::new();
static FORBIDDEN_KEYWORD: OnceLock<Regex> = OnceLock::new();

/// Query safety gate (§4.3), reused by `testQuery`. After placeholder
/// substitution the statement must begin — case-insensitively, ignoring
/// leading whitespace and comments — with `SELECT`, and must not contain any
/// of the listed write/DDL keywords as a whole word.
pub fn check_query_is_safe(sql: &str) -> Result<(), EtlError> {
    let leading = LEADING_NOISE.get_or_init(|| Regex::new(r"(?s)^(\s|--[^\n]*\n?|/\*.*?\*/)*").unwrap());
    let stripped = leading.replace(sql, "");

    if !stripped.trim_start().to_ascii_uppercase().starts_with("SELECT") {
        return Err(EtlError::Validation(
            "query safety gate: statement must begin with SELECT".to_string(),
        ));
    }

    let forbidden =
        FORBIDDEN_KEYWORD.get_or_init(|| Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|DROP|TRUNCATE|ALTER|CREATE)\b").unwrap());
    if let Some(found) = forbidden.find(sql) {
        return Err(EtlError::Validation(format!(
            "query safety gate: forbidden keyword {:?} present",
            found.as_str()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_passes() {
        check_query_is_safe("SELECT * FROM t WHERE ts > :fromTime").unwrap();
    }

    #[test]
    fn leading_whitespace_and_line_comment_are_tolerated() {
        check_query_is_safe("  -- pull window\nSELECT 1").unwrap();
    }

    #[test]
    fn lowercase_select_passes() {
        check_query_is_safe("select 1").unwrap();
    }

    #[test]
    fn rejects_statements_not_starting_with_select() {
        assert!(check_query_is_safe("DELETE FROM t").is_err());
    }

    #[test]
    fn rejects_embedded_write_keyword_even_inside_a_select() {
        assert!(check_query_is_safe("SELECT 1; DROP TABLE t").is_err());
    }

    #[test]
    fn does_not_false_positive_on_keyword_as_a_substring_of_an_identifier() {
        check_query_is_safe("SELECT updated_at, created_by FROM t").unwrap();
    }
}
