use std::fmt::{self, Display, Formatter};

use owo_colors::{OwoColorize, Style as OwoStyle};
use tabled::{builder::Builder, settings::Style as TableStyle, settings::Width};

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    /// Creates a painter with explicit colour control.
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}

/// A structured table that renders via `Display`, clamped to the terminal
/// width.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table with column headers and data rows.
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Creates a two-column field/value table with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["field", "value"], records)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        if let Some((terminal_size::Width(width), _)) = terminal_size::terminal_size() {
            table.with(Width::truncate(usize::from(width)));
        }
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plain_painter_returns_unstyled_text() {
        let painter = Painter::new(false);
        assert_eq!("zones", painter.heading("zones"));
        assert_eq!("3", painter.value("3"));
        assert_eq!("field", painter.muted("field"));
    }

    #[test]
    fn coloured_painter_wraps_the_text() {
        let painter = Painter::new(true);
        let styled = painter.heading("zones");
        assert_ne!("zones", styled);
        assert!(styled.contains("zones"));
    }

    #[test]
    fn grid_table_renders_headers_and_rows() {
        let table = Table::grid(
            ["layer", "events"],
            vec![
                vec!["wire".into(), "12".into()],
                vec!["service".into(), "3".into()],
            ],
        );
        let rendered = table.to_string();
        assert!(rendered.contains("layer"));
        assert!(rendered.contains("wire"));
        assert!(rendered.contains("12"));
    }
}
