/// Contiguous pipe-delimited lines recognised as one table.
#[derive(Debug, Default)]
pub struct TableBlock {
    rows: Vec<Vec<String>>,
    separator_after_first: bool,
    source_lines: Vec<String>,
}

impl TableBlock {
    fn push_row(&mut self, line: &str, cells: Vec<String>) {
        self.rows.push(cells);
        self.source_lines.push(line.to_string());
    }

    fn push_separator(&mut self, line: &str) {
        if self.rows.len() == 1 {
            self.separator_after_first = true;
        }
        self.source_lines.push(line.to_string());
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Decided once per block, from the first row only.
    pub fn has_header(&self) -> bool {
        let Some(first) = self.rows.first() else {
            return false;
        };
        self.rows.len() > 1
            && (self.separator_after_first
                || first.iter().all(|cell| is_uppercase(cell))
                || first.iter().any(|cell| cell.contains(':')))
    }

    /// Renders the table on a single line so later line-based stages treat it as one block.
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return self.source_lines.join("\n");
        }
        let mut html = String::from("<table>");
        let mut body = self.rows.as_slice();
        if self.has_header() {
            html.push_str("<thead>");
            push_row(&mut html, &self.rows[0], "th");
            html.push_str("</thead>");
            body = &self.rows[1..];
        }
        html.push_str("<tbody>");
        for row in body {
            push_row(&mut html, row, "td");
        }
        html.push_str("</tbody></table>");
        html
    }
}

fn push_row(html: &mut String, cells: &[String], tag: &str) {
    html.push_str("<tr>");
    for cell in cells {
        html.push_str(&format!("<{tag}>{cell}</{tag}>"));
    }
    html.push_str("</tr>");
}

fn is_uppercase(cell: &str) -> bool {
    cell.chars().any(char::is_uppercase) && !cell.chars().any(char::is_lowercase)
}

/// Splits a candidate row into cells: the line must split into more than two
/// pieces on `|`, and empty cells produced by boundary pipes are dropped.
pub fn split_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if !trimmed.contains('|') {
        return None;
    }
    let mut cells: Vec<&str> = trimmed.split('|').map(str::trim).collect();
    if cells.len() <= 2 {
        return None;
    }
    if cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    if cells.iter().all(|c| c.is_empty()) {
        return None;
    }
    Some(cells.into_iter().map(str::to_string).collect())
}

/// Only dashes, colons, pipes and whitespace, with at least one pipe and one dash.
pub fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '-' | '|' | ':') || c.is_whitespace())
}

pub fn convert_tables(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut current: Option<TableBlock> = None;

    for line in text.split('\n') {
        if let Some(block) = current.as_mut() {
            if is_separator(line) {
                block.push_separator(line);
                continue;
            }
        }
        match split_row(line) {
            Some(cells) => {
                let block = current.get_or_insert_with(TableBlock::default);
                if is_separator(line) {
                    block.push_separator(line);
                } else {
                    block.push_row(line, cells);
                }
            }
            None => {
                if let Some(block) = current.take() {
                    out.push(block.render());
                }
                out.push(line.to_string());
            }
        }
    }
    if let Some(block) = current.take() {
        out.push(block.render());
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_forms_one_row_table() {
        assert_eq!(
            convert_tables("A | B | C"),
            "<table><tbody><tr><td>A</td><td>B</td><td>C</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_two_cell_prose_is_not_a_table() {
        assert_eq!(convert_tables("either this | or that"), "either this | or that");
    }

    #[test]
    fn test_boundary_pipes_and_separator() {
        let html = convert_tables("| Name | Age |\n|------|:---:|\n| Bob | 3 |\nafter");
        assert_eq!(
            html,
            "<table><thead><tr><th>Name</th><th>Age</th></tr></thead>\
             <tbody><tr><td>Bob</td><td>3</td></tr></tbody></table>\nafter"
        );
    }

    #[test]
    fn test_uppercase_first_row_is_header() {
        let html = convert_tables("ID | NAME | ROLE\n1 | ann | dev");
        assert!(html.starts_with("<table><thead><tr><th>ID</th>"));
    }

    #[test]
    fn test_colon_in_first_row_is_header() {
        let html = convert_tables("key: a | b | c\n1 | 2 | 3");
        assert!(html.contains("<thead>"));
    }

    #[test]
    fn test_lowercase_first_row_is_body() {
        let html = convert_tables("a | b | c\nd | e | f");
        assert!(!html.contains("<thead>"));
        assert_eq!(html.matches("<tr>").count(), 2);
    }

    #[test]
    fn test_lone_separator_is_left_as_text() {
        assert_eq!(convert_tables("|---|---|\ntext"), "|---|---|\ntext");
    }

    #[test]
    fn test_blank_line_ends_block() {
        let html = convert_tables("a | b | c\n\nd | e | f");
        assert_eq!(html.matches("<table>").count(), 2);
    }
}
