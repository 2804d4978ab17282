//! Shell-style tokenizing of command lines.

/// Simple shell-like argument splitting for plain text.
///
/// Handles:
/// - Whitespace-separated arguments
/// - Quoted strings (single and double quotes)
/// - Backslash escapes outside single quotes
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;
    let mut quoted = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                quoted = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                quoted = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}

/// Splits `text` at its first whitespace run into the leading word and the
/// remainder. Both halves are trimmed.
pub fn split_head(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim_start()),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_split_simple() {
        let args = shell_split("echo hello world");
        assert_eq!(args, vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_shell_split_quoted() {
        let args = shell_split(r#"echo "hello world" test"#);
        assert_eq!(args, vec!["echo", "hello world", "test"]);
    }

    #[test]
    fn test_shell_split_mixed_quotes() {
        let args = shell_split(r#"cmd "double's quote" 'single"s quote'"#);
        assert_eq!(args, vec!["cmd", "double's quote", r#"single"s quote"#]);
    }

    #[test]
    fn test_shell_split_escapes_and_empty_quotes() {
        assert_eq!(shell_split(r"a\ b c"), vec!["a b", "c"]);
        assert_eq!(shell_split(r#"say "" x"#), vec!["say", "", "x"]);
    }

    #[test]
    fn test_shell_split_whitespace_only() {
        assert!(shell_split("").is_empty());
        assert!(shell_split("   \t  ").is_empty());
    }

    #[test]
    fn test_split_head() {
        assert_eq!(split_head("  roll  2d6  +1 "), ("roll", "2d6  +1"));
        assert_eq!(split_head("help"), ("help", ""));
        assert_eq!(split_head(""), ("", ""));
    }
}
