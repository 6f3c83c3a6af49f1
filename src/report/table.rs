// ABOUTME: Plain text tables for the audit transcript
// ABOUTME: Renders padded grids and markdown tables sized by display width

use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Grid,
    Markdown,
}

#[derive(Debug, Clone)]
pub struct Table {
    layout: Layout,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Borderless table, cells separated by a single space
    pub fn grid() -> Self {
        Self {
            layout: Layout::Grid,
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Markdown pipe table with a header row
    pub fn markdown<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            layout: Layout::Markdown,
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn render(&self) -> String {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);
        let mut widths = vec![0; columns];
        for row in std::iter::once(&self.headers).chain(&self.rows) {
            for (index, cell) in row.iter().enumerate() {
                widths[index] = widths[index].max(cell.width());
            }
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        match self.layout {
            Layout::Grid => {
                for row in &self.rows {
                    lines.push(pad_row(row, &widths).join(" ").trim_end().to_string());
                }
            }
            Layout::Markdown => {
                lines.push(format!("| {} |", pad_row(&self.headers, &widths).join(" | ")));
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
                lines.push(format!("|{}|", rule.join("|")));
                for row in &self.rows {
                    lines.push(format!("| {} |", pad_row(row, &widths).join(" | ")));
                }
            }
        }
        lines.join("\n")
    }
}

fn pad_row(row: &[String], widths: &[usize]) -> Vec<String> {
    widths
        .iter()
        .enumerate()
        .map(|(index, width)| {
            let cell = row.get(index).map(String::as_str).unwrap_or("");
            let padding = width.saturating_sub(cell.width());
            format!("{}{}", cell, " ".repeat(padding))
        })
        .collect()
}
