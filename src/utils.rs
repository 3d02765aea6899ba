/// Calculates the 1-based line and column number for a given byte position in the source text.
/// This function is designed to be called only when an error occurs, as it iterates through
/// the source text to determine the position.
pub fn get_line_and_column(source: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= position {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_character() {
        assert_eq!(get_line_and_column("abc", 0), (1, 1));
    }

    #[test]
    fn test_after_newlines() {
        let source = "a\nbc\ndef";
        assert_eq!(get_line_and_column(source, 3), (2, 2));
        assert_eq!(get_line_and_column(source, 5), (3, 1));
    }

    #[test]
    fn test_multibyte_characters_count_as_one_column() {
        let source = "€x";
        assert_eq!(get_line_and_column(source, "€".len()), (1, 2));
    }
}
