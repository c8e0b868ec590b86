/// Split a command line string into arguments.
///
/// Whitespace separates arguments except inside single or double quotes.
/// Quotes are removed; an unterminated quote runs to the end of the input.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if in_arg {
        args.push(current);
    }
    args
}

/// Join arguments into a single string that [`split_args`] splits back.
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| quote_arg(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quotes {
        return arg.to_string();
    }
    if !arg.contains('"') {
        return format!("\"{}\"", arg);
    }
    if !arg.contains('\'') {
        return format!("'{}'", arg);
    }
    // Both quote kinds: double-quote the runs between '"' and single-quote each '"'.
    let mut quoted = String::new();
    for (i, part) in arg.split('"').enumerate() {
        if i > 0 {
            quoted.push_str("'\"'");
        }
        if !part.is_empty() {
            quoted.push('"');
            quoted.push_str(part);
            quoted.push('"');
        }
    }
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(split_args("  -a  b\tc "), vec!["-a", "b", "c"]);
    }

    #[test]
    fn keeps_quoted_spaces() {
        assert_eq!(
            split_args(r#"--name "Base case" 'x y' z"#),
            vec!["--name", "Base case", "x y", "z"]
        );
    }

    #[test]
    fn empty_quotes_give_empty_argument() {
        assert_eq!(split_args(r#"a "" b"#), vec!["a", "", "b"]);
    }

    #[test]
    fn empty_line_has_no_arguments() {
        assert!(split_args("").is_empty());
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn join_quotes_arguments_with_spaces() {
        let joined = join_args(&["run", "two words", ""]);
        assert_eq!(joined, r#"run "two words" """#);
        assert_eq!(split_args(&joined), vec!["run", "two words", ""]);

        let args = ["--name=O'Brien", r#"say "hi""#, r#"it's "both""#, "'"];
        assert_eq!(split_args(&join_args(&args)), args);
    }

    #[test]
    fn adjacent_quoted_parts_form_one_argument() {
        assert_eq!(split_args(r#""a"'"'"b c""#), vec![r#"a"b c"#]);
    }
}
