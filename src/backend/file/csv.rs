//! Quoting rule and line codec for the data file

use crate::error::{AppError, AppResult};

const QUOTE: char = '"';
const DELIMITER: char = ',';

/// Quote a value iff it contains a delimiter or a quote
///
/// A value that already looks quoted is escaped again, so `parse_line`
/// always hands back exactly what was written.
pub fn quote(value: &str) -> String {
    if value.contains(DELIMITER) || value.contains(QUOTE) {
        format!("\"{}\"", value.replace(QUOTE, "\"\""))
    } else {
        value.to_string()
    }
}

/// Join cells into one line, quoting each as needed
pub fn format_line<'a, I>(cells: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    cells
        .into_iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(",")
}

/// Split one line into unquoted cells
pub fn parse_line(line: &str) -> AppResult<Vec<String>> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    current.push(QUOTE);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == QUOTE {
            in_quotes = true;
        } else if c == DELIMITER {
            cells.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    if in_quotes {
        return Err(AppError::Configuration(format!(
            "Unterminated quoted value in line: {}",
            line
        )));
    }

    cells.push(current);
    Ok(cells)
}
