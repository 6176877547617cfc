use serde_json::Value;

use terminal_size::{terminal_size, Width};

use crate::grist::ColumnDescriptor;

const COLUMN_HEADERS: [&str; 3] = ["ID", "Label", "Type"];

// Print the visible columns of a table as an ASCII table.
pub fn print_columns(table_id: &str, columns: &[ColumnDescriptor]) {
    println!("columns of {}:", table_id);
    for line in render_columns(columns, get_terminal_width()) {
        println!("{}", line);
    }
}

// Lines of the column table, each fitted to `termw`.
pub fn render_columns(columns: &[ColumnDescriptor], termw: usize) -> Vec<String> {
    let headers: Vec<String> = COLUMN_HEADERS.iter().map(|s| s.to_string()).collect();
    let rows: Vec<Vec<String>> = columns
        .iter()
        .map(|c| vec![c.id.clone(), c.fields.label.clone(), c.type_tag().to_string()])
        .collect();
    crate::tprintln!("[cli.outputformatter] rendering {} columns at width {}", rows.len(), termw);

    let mut widths: Vec<usize> = headers.iter().map(|s| s.chars().count().min(termw)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count().min(termw));
        }
    }

    let sep = build_separator(&widths);
    let mut out = Vec::with_capacity(rows.len() + 5);
    out.push(fit_line_to_width(&sep, termw));
    out.push(fit_line_to_width(&build_row(&headers, &widths), termw));
    out.push(fit_line_to_width(&sep, termw));
    for r in &rows {
        out.push(fit_line_to_width(&build_row(r, &widths), termw));
    }
    out.push(fit_line_to_width(&sep, termw));
    out.push(format!("cols: {}", rows.len()));
    out
}

// Pretty JSON for backend responses; falls back to compact output.
pub fn print_response(val: &Value) {
    match serde_json::to_string_pretty(val) {
        Ok(s) => println!("{}", s),
        Err(_) => println!("{}", val),
    }
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let text = truncate(cells.get(i).map(|c| c.as_str()).unwrap_or(""), *w);
        let pad = w.saturating_sub(text.chars().count());
        s.push(' ');
        s.push_str(&text);
        s.push_str(&" ".repeat(pad));
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn get_terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) if w > 4 => (w - 4) as usize,
        _ => 80,
    }
}

// Keep both ends of an over-long line and elide the middle.
fn fit_line_to_width(s: &str, maxw: usize) -> String {
    let len = s.chars().count();
    if len <= maxw { return s.to_string(); }
    if maxw <= 3 { return "…".to_string(); }
    let budget = maxw - 1;
    let front = budget / 2;
    let back = budget - front;
    let head: String = s.chars().take(front).collect();
    let tail: String = s.chars().skip(len - back).collect();
    format!("{}…{}", head, tail)
}
