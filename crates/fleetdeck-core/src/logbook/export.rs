use super::LogEntry;

/// One JSON object per line, every field included.
pub fn to_jsonl<'a>(entries: impl Iterator<Item = &'a LogEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        match serde_json::to_string(entry) {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            },
            Err(e) => tracing::warn!(id = entry.id, error = %e, "Skipping unserializable entry"),
        }
    }
    out
}

/// Flat tabular export with a header row.
pub fn to_csv<'a>(entries: impl Iterator<Item = &'a LogEntry>) -> String {
    let mut out = String::from("id,timestamp,agent,level,source,severity,category,tags,message\n");
    for entry in entries {
        let row = [
            entry.id.to_string(),
            entry.timestamp.clone(),
            entry.agent.clone(),
            entry.level.as_str().to_string(),
            entry.source.as_str().to_string(),
            entry.severity.to_string(),
            entry.category.clone().unwrap_or_default(),
            entry.tags.join(" "),
            entry.message.clone(),
        ];
        let escaped: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
