use crate::domain::schema::{default_column_comment, SchemaSnapshot};

/// Markdown rendering of the whole schema, one numbered section per table
/// with a `| column | type | comment |` table underneath.
pub fn format_schema_markdown(schema: &SchemaSnapshot) -> String {
    let mut out = String::from("Database structure:\n\n");

    for (idx, table) in schema.tables.iter().enumerate() {
        out.push_str(&format!(
            "{}. **{}** - {}\n",
            idx + 1,
            table.name,
            table.comment
        ));
        out.push_str("   | column | type | comment |\n");
        out.push_str("   | ------ | ---- | ------- |\n");

        for column in &table.columns {
            let comment = if column.comment.trim().is_empty() {
                default_column_comment(&column.name)
            } else {
                escape_cell(&column.comment)
            };
            out.push_str(&format!(
                "   | {} | {} | {} |\n",
                column.name, column.data_type, comment
            ));
        }
        out.push('\n');
    }

    out
}

/// Short `- table: comment` list used as classifier context. Empty when the
/// schema has no tables.
pub fn format_table_summary(schema: &SchemaSnapshot) -> String {
    if schema.is_empty() {
        return String::new();
    }

    let mut out = String::from("<tables>\n");
    for table in &schema.tables {
        out.push_str(&format!("- {}: {}\n", table.name, table.comment));
    }
    out.push_str("</tables>\n");
    out
}

fn escape_cell(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace(|c: char| c == '\n' || c == '\r', " ")
}
