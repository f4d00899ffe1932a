use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LIST_ITEM: Regex =
        Regex::new(r"^([ \t]*)([*+\-]|\d+\.)\s+(.*)$").expect("Invalid list item regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "ul",
            ListKind::Ordered => "ol",
        }
    }
}

/// An open list: its kind and the indentation of its markers. The list's last
/// `<li>` is always still open while it sits on the stack.
#[derive(Debug, Clone, Copy)]
struct ListBlock {
    kind: ListKind,
    indent: usize,
}

struct ListItem<'a> {
    kind: ListKind,
    indent: usize,
    text: &'a str,
}

fn parse_item(line: &str) -> Option<ListItem<'_>> {
    let caps = LIST_ITEM.captures(line)?;
    let indent = caps[1]
        .chars()
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum();
    let kind = if caps[2].ends_with('.') {
        ListKind::Ordered
    } else {
        ListKind::Unordered
    };
    let text = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    Some(ListItem { kind, indent, text })
}

#[derive(Default)]
struct ListWriter {
    stack: Vec<ListBlock>,
    html: String,
}

impl ListWriter {
    fn is_open(&self) -> bool {
        !self.stack.is_empty()
    }

    fn open(&mut self, kind: ListKind, indent: usize, text: &str) {
        self.html.push_str(&format!("<{}><li>{}", kind.tag(), text));
        self.stack.push(ListBlock { kind, indent });
    }

    fn close_top(&mut self) {
        if let Some(block) = self.stack.pop() {
            self.html.push_str(&format!("</li></{}>", block.kind.tag()));
        }
    }

    fn item(&mut self, item: ListItem<'_>) {
        while self.stack.last().is_some_and(|top| top.indent > item.indent) {
            self.close_top();
        }
        match self.stack.last().copied() {
            None => self.open(item.kind, item.indent, item.text),
            Some(top) if top.indent < item.indent => self.open(item.kind, item.indent, item.text),
            Some(top) if top.kind == item.kind => {
                self.html.push_str("</li><li>");
                self.html.push_str(item.text);
            }
            Some(_) => {
                // Switching marker type at the same depth closes the list.
                self.close_top();
                self.open(item.kind, item.indent, item.text);
            }
        }
    }

    fn finish(&mut self) -> String {
        while self.is_open() {
            self.close_top();
        }
        std::mem::take(&mut self.html)
    }
}

/// Converts runs of `-`/`*`/`+` and `N.` lines into `<ul>`/`<ol>` markup. Each
/// list is emitted on a single line; indented markers nest inside the previous item.
pub fn convert_lists(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut writer = ListWriter::default();

    for line in text.split('\n') {
        match parse_item(line) {
            Some(item) => writer.item(item),
            None => {
                if writer.is_open() {
                    out.push(writer.finish());
                }
                out.push(line.to_string());
            }
        }
    }
    if writer.is_open() {
        out.push(writer.finish());
    }
    out.join("\n")
}
