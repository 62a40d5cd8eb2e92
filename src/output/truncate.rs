//! Format-aware output truncation.
//!
//! Each truncator keeps the structural parts of its format and drops data
//! rows from the end until the output fits, then appends a marker stating
//! how many rows were shown and omitted. Input that does not look like the
//! expected format is cut at a byte boundary instead. Every path keeps the
//! result within `max_bytes`.

/// Suffix appended by raw byte truncation.
pub const BYTE_TRUNCATION_SUFFIX: &str = "\n...truncated";

/// Outcome of a truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub content: String,
    pub truncated: bool,
    /// Data rows kept, when rows could be identified.
    pub rows_shown: Option<usize>,
    pub rows_omitted: Option<usize>,
}

impl Truncation {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            truncated: false,
            rows_shown: None,
            rows_omitted: None,
        }
    }

    fn rows(content: String, shown: usize, omitted: usize) -> Self {
        Self {
            content,
            truncated: true,
            rows_shown: Some(shown),
            rows_omitted: Some(omitted),
        }
    }

    fn bytes(content: &str, max_bytes: usize) -> Self {
        Self {
            content: truncate_bytes(content, max_bytes),
            truncated: true,
            rows_shown: None,
            rows_omitted: None,
        }
    }

    pub fn into_parts(self) -> (String, bool) {
        (self.content, self.truncated)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Cut at a UTF-8 boundary so the result, suffix included, fits `max_bytes`.
pub fn truncate_bytes(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    if max_bytes < BYTE_TRUNCATION_SUFFIX.len() {
        return content[..floor_char_boundary(content, max_bytes)].to_string();
    }
    let keep = floor_char_boundary(content, max_bytes - BYTE_TRUNCATION_SUFFIX.len());
    format!("{}{}", &content[..keep], BYTE_TRUNCATION_SUFFIX)
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

/// Largest `k < rows.len()` with `fixed(k) + rows[..k] <= max_bytes`, where
/// each kept row costs its length plus one newline.
fn rows_that_fit(rows: &[&str], max_bytes: usize, fixed: impl Fn(usize) -> usize) -> Option<usize> {
    let mut best = None;
    let mut used = 0usize;
    for k in 0..rows.len() {
        if fixed(k) + used <= max_bytes {
            best = Some(k);
        }
        used += rows[k].len() + 1;
    }
    best
}

fn join_len(parts: &[&str]) -> usize {
    parts.iter().map(|p| p.len() + 1).sum()
}

/// Parse `data[N]{cols}:` or `data[N]:`, returning the text after the count.
fn toon_data_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data[")?;
    let close = rest.find(']')?;
    rest[..close].parse::<usize>().ok()?;
    let tail = &rest[close + 1..];
    tail.ends_with(':').then_some(tail)
}

/// Truncate a structured text envelope.
///
/// Keeps everything outside the `data` rows: preceding lines, `included_*`
/// tables, `pagination`. A `truncation:` section is placed right after the
/// kept rows and the `data[N]` count is rewritten.
pub fn truncate_toon(content: &str, max_bytes: usize) -> Truncation {
    if content.len() <= max_bytes {
        return Truncation::unchanged(content);
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let Some((header_idx, tail)) = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| toon_data_header(l).map(|t| (i, t)))
    else {
        return Truncation::bytes(content, max_bytes);
    };

    let rows_end = lines[header_idx + 1..]
        .iter()
        .position(|l| !l.starts_with("  "))
        .map_or(lines.len(), |p| header_idx + 1 + p);
    let prefix = &lines[..header_idx];
    let rows = &lines[header_idx + 1..rows_end];
    let suffix = &lines[rows_end..];
    let total = rows.len();

    // "data[" + k + "]" + tail, then "truncation:", "  rowsShown: k", "  rowsOmitted: m".
    let fixed = |k: usize| {
        let header = 5 + digits(k) + 1 + tail.len() + 1;
        let section = "truncation:".len() + 1
            + "  rowsShown: ".len() + digits(k) + 1
            + "  rowsOmitted: ".len() + digits(total - k);
        let tail_lines = if suffix.is_empty() { 0 } else { 1 + join_len(suffix) - 1 };
        join_len(prefix) + header + section + tail_lines
    };

    let Some(kept) = rows_that_fit(rows, max_bytes, fixed) else {
        return Truncation::bytes(content, max_bytes);
    };

    let mut out: Vec<String> = prefix.iter().map(|l| l.to_string()).collect();
    out.push(format!("data[{}]{}", kept, tail));
    out.extend(rows[..kept].iter().map(|l| l.to_string()));
    out.push("truncation:".to_string());
    out.push(format!("  rowsShown: {}", kept));
    out.push(format!("  rowsOmitted: {}", total - kept));
    out.extend(suffix.iter().map(|l| l.to_string()));

    Truncation::rows(out.join("\n"), kept, total - kept)
}

/// Insert a `cursor:` line after `rowsOmitted` in a truncation section.
///
/// Content without a truncation section is returned unchanged.
pub fn insert_cursor_in_toon_truncation(content: &str, cursor: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let Some(section) = lines.iter().position(|l| *l == "truncation:") else {
        return content.to_string();
    };
    let Some(omitted) = lines[section..]
        .iter()
        .position(|l| l.starts_with("  rowsOmitted:"))
        .map(|p| section + p)
    else {
        return content.to_string();
    };

    let cursor_line = format!("  cursor: {}", cursor);
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..=omitted]);
    out.push(&cursor_line);
    out.extend_from_slice(&lines[omitted + 1..]);
    out.join("\n")
}

/// Truncate a Markdown table, keeping its header and separator rows.
///
/// The footer reads `_...truncated: k rows shown of T (m omitted)_`, where
/// `T` is `original_total` when known, otherwise the rendered row count.
pub fn truncate_markdown(
    content: &str,
    max_bytes: usize,
    original_total: Option<usize>,
) -> Truncation {
    if content.len() <= max_bytes {
        return Truncation::unchanged(content);
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let Some(header_idx) = lines.iter().position(|l| l.trim_start().starts_with('|')) else {
        return Truncation::bytes(content, max_bytes);
    };
    let is_separator = lines
        .get(header_idx + 1)
        .is_some_and(|l| l.trim_start().starts_with('|') && l.contains("---"));
    if !is_separator {
        return Truncation::bytes(content, max_bytes);
    }

    let body_start = header_idx + 2;
    let rows_end = lines[body_start..]
        .iter()
        .position(|l| !l.trim_start().starts_with('|'))
        .map_or(lines.len(), |p| body_start + p);
    let head = &lines[..body_start];
    let rows = &lines[body_start..rows_end];
    let suffix = &lines[rows_end..];
    let rendered = rows.len();
    let total = original_total.unwrap_or(rendered).max(rendered);

    let footer = |k: usize| {
        format!(
            "_...truncated: {} rows shown of {} ({} omitted)_",
            k,
            total,
            total - k
        )
    };
    let fixed = |k: usize| {
        let tail_lines = if suffix.is_empty() { 0 } else { 1 + join_len(suffix) - 1 };
        join_len(head) + 1 + footer(k).len() + tail_lines
    };

    let Some(kept) = rows_that_fit(rows, max_bytes, fixed) else {
        return Truncation::bytes(content, max_bytes);
    };

    let mut out: Vec<String> = head.iter().map(|l| l.to_string()).collect();
    out.extend(rows[..kept].iter().map(|l| l.to_string()));
    out.push(String::new());
    out.push(footer(kept));
    out.extend(suffix.iter().map(|l| l.to_string()));

    Truncation::rows(out.join("\n"), kept, total - kept)
}

/// Truncate JSON Lines output.
///
/// Envelope lines (starting with `{"$`) are kept, data lines are dropped from
/// the end, and a final `{"truncated":true,...}` line is appended.
pub fn truncate_jsonl(content: &str, max_bytes: usize) -> Truncation {
    if content.len() <= max_bytes {
        return Truncation::unchanged(content);
    }

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.iter().any(|l| !l.trim_start().starts_with('{')) {
        return Truncation::bytes(content, max_bytes);
    }
    let (envelope, rows): (Vec<&str>, Vec<&str>) =
        lines.into_iter().partition(|l| l.trim_start().starts_with("{\"$"));
    let total = rows.len();

    let marker = |k: usize| {
        format!(
            "{{\"truncated\":true,\"rowsShown\":{},\"rowsOmitted\":{}}}",
            k,
            total - k
        )
    };
    let fixed = |k: usize| join_len(&envelope) + marker(k).len();

    let Some(kept) = rows_that_fit(&rows, max_bytes, fixed) else {
        return Truncation::bytes(content, max_bytes);
    };

    let mut out = String::new();
    for line in rows[..kept].iter().chain(envelope.iter()) {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&marker(kept));

    Truncation::rows(out, kept, total - kept)
}

/// Split CSV text into records, honouring quoted newlines.
fn csv_records(content: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in content.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\n' if !in_quotes => {
                let record = content[start..i].strip_suffix('\r').unwrap_or(&content[start..i]);
                records.push(record);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < content.len() {
        records.push(&content[start..]);
    }
    records
}

/// Truncate CSV output, keeping the header row.
///
/// Appends `# truncated: rowsShown=k rowsOmitted=m total=T`. When not even
/// the marker fits, only the header is kept.
pub fn truncate_csv(content: &str, max_bytes: usize, original_total: Option<usize>) -> Truncation {
    if content.len() <= max_bytes {
        return Truncation::unchanged(content);
    }

    let records = csv_records(content);
    let Some((header, rows)) = records.split_first() else {
        return Truncation::bytes(content, max_bytes);
    };
    let rendered = rows.len();
    let total = original_total.unwrap_or(rendered).max(rendered);

    let marker = |k: usize| {
        format!(
            "# truncated: rowsShown={} rowsOmitted={} total={}",
            k,
            total - k,
            total
        )
    };
    let fixed = |k: usize| header.len() + 1 + marker(k).len() + 1;

    match rows_that_fit(rows, max_bytes, fixed) {
        Some(kept) => {
            let mut out = String::new();
            for line in std::iter::once(header).chain(rows[..kept].iter()) {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&marker(kept));
            out.push('\n');
            Truncation::rows(out, kept, total - kept)
        }
        None => {
            // Header-only output still carries a marker, without the total.
            let short = format!(
                "{}\n# truncated: rowsShown=0 rowsOmitted={}\n",
                header, total
            );
            if short.len() <= max_bytes {
                Truncation::rows(short, 0, total)
            } else {
                Truncation::bytes(content, max_bytes)
            }
        }
    }
}
