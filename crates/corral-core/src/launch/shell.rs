use crate::error::BuildError;

/// Quote `token` for a POSIX shell.
///
/// Tokens made only of safe characters are returned unchanged; anything else
/// is wrapped in single quotes with embedded quotes escaped as `'\''`.
pub fn shell_quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_safe) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}

/// Split `line` into words the way a POSIX shell would, without expansion.
///
/// Single quotes are literal, double quotes honour `\\`, `\"`, `\$` and
/// `` \` `` escapes, and a bare backslash escapes the next character.
pub fn split_words(line: &str) -> Result<Vec<String>, BuildError> {
    let unterminated = || BuildError::UnterminatedQuote(line.to_string());
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next().ok_or_else(unterminated)? {
                        '\'' => break,
                        c => word.push(c),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next().ok_or_else(unterminated)? {
                        '"' => break,
                        '\\' => match chars.next().ok_or_else(unterminated)? {
                            c @ ('\\' | '"' | '$' | '`') => word.push(c),
                            c => {
                                word.push('\\');
                                word.push(c);
                            }
                        },
                        c => word.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '+' | '@' | '%')
}
