//! Formatted output helpers for CLI commands.

/// Gap between table columns.
const COLUMN_GAP: usize = 3;

/// Renders `rows` under `headers` as left-aligned, space-padded columns.
///
/// Every line ends with a newline; trailing padding is trimmed.
#[must_use]
pub fn table<S: AsRef<str>>(headers: &[&str], rows: &[Vec<S>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.as_ref().chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, headers.iter().copied(), &widths);
    for row in rows {
        push_line(&mut out, row.iter().map(|c| c.as_ref()), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (cell, width) in cells.zip(widths) {
        line.push_str(cell);
        let pad = width + COLUMN_GAP - cell.chars().count();
        line.extend(std::iter::repeat_n(' ', pad));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_when_empty() {
        let rows: Vec<Vec<String>> = Vec::new();
        assert_eq!(table(&["ID", "NAME"], &rows), "ID   NAME\n");
    }

    #[test]
    fn columns_align_to_widest_cell() {
        let rows = vec![vec!["0123456789", "web"], vec!["1", "database"]];
        let out = table(&["ID", "NAME"], &rows);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("ID{}NAME", " ".repeat(11)));
        assert_eq!(lines[1], "0123456789   web");
        assert_eq!(lines[2], format!("1{}database", " ".repeat(12)));
    }
}
