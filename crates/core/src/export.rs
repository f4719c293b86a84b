//! Rendering an outline forest as JSON, CSV, or indented text.

use serde::{Deserialize, Serialize};

use crate::hierarchy::{flatten, BookmarkNode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_page_info: bool,
    pub include_level_info: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Json,
            include_page_info: true,
            include_level_info: true,
        }
    }
}

/// JSON view of a node; fields are dropped according to [`ExportOptions`].
#[derive(Serialize)]
struct ExportNode<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<u8>,
    /// Outer `None` omits the field, inner `None` writes `null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ExportNode<'a>>,
}

impl<'a> ExportNode<'a> {
    fn from_node(node: &'a BookmarkNode, options: &ExportOptions) -> Self {
        Self {
            title: &node.title,
            level: options.include_level_info.then_some(node.level),
            page: options.include_page_info.then_some(node.page),
            children: node
                .children
                .iter()
                .map(|c| ExportNode::from_node(c, options))
                .collect(),
        }
    }
}

/// Render the forest in the requested format.
pub fn export_forest(forest: &[BookmarkNode], options: &ExportOptions) -> Result<String, serde_json::Error> {
    match options.format {
        ExportFormat::Json => render_json(forest, options),
        ExportFormat::Csv => Ok(render_csv(forest, options)),
        ExportFormat::Txt => Ok(render_txt(forest, options)),
    }
}

fn render_json(forest: &[BookmarkNode], options: &ExportOptions) -> Result<String, serde_json::Error> {
    let nodes: Vec<ExportNode> = forest.iter().map(|n| ExportNode::from_node(n, options)).collect();
    let mut out = serde_json::to_string_pretty(&nodes)?;
    out.push('\n');
    Ok(out)
}

fn render_csv(forest: &[BookmarkNode], options: &ExportOptions) -> String {
    let mut header = vec!["title"];
    if options.include_level_info {
        header.push("level");
    }
    if options.include_page_info {
        header.push("page");
    }

    let mut out = header.join(",");
    out.push('\n');
    for node in flatten(forest) {
        let mut row = Vec::with_capacity(3);
        // Without a level column, depth survives as indentation.
        if options.include_level_info {
            row.push(csv_escape(&node.title));
            row.push(node.level.to_string());
        } else {
            row.push(csv_escape(&format!("{}{}", indent(node.level), node.title)));
        }
        if options.include_page_info {
            row.push(node.page.map(|p| p.to_string()).unwrap_or_default());
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn render_txt(forest: &[BookmarkNode], options: &ExportOptions) -> String {
    let mut out = String::new();
    for node in flatten(forest) {
        out.push_str(&indent(node.level));
        out.push_str(&node.title);

        let mut info = Vec::new();
        if options.include_level_info {
            info.push(format!("level {}", node.level));
        }
        if let Some(page) = node.page.filter(|_| options.include_page_info) {
            info.push(format!("page {page}"));
        }
        if !info.is_empty() {
            out.push_str(&format!(" ({})", info.join(", ")));
        }
        out.push('\n');
    }
    out
}

fn indent(level: u8) -> String {
    "  ".repeat(usize::from(level.saturating_sub(1)))
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
pub fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) || field.starts_with(' ') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
