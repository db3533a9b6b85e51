//! Subject line templating
//!
//! A deliberately small evaluator: `{{.Name}}` substitution plus
//! `{{printf "%0Nd" .Name}}` zero-padded numbers, nothing else. Any parse
//! or lookup failure makes the caller fall back to the fixed format
//! `"(PP/TT) - NAME - (SIZE) yEnc (CCCC/TTTT)"`.

/// Values available to the subject template
#[derive(Debug, Clone)]
pub struct SubjectVars {
    /// Part ordinal within the file
    pub index: u32,
    /// Total number of parts
    pub total: u32,
    /// Posted file name
    pub filename: String,
    /// Human-readable total size
    pub size: String,
    /// Global chunk ordinal
    pub chunk_index: u32,
    /// Total number of chunks
    pub total_chunks: u32,
}

impl SubjectVars {
    fn lookup(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "Index" => Some(Value::Number(self.index)),
            "Total" => Some(Value::Number(self.total)),
            "Filename" => Some(Value::Text(&self.filename)),
            "Size" => Some(Value::Text(&self.size)),
            "ChunkIndex" => Some(Value::Number(self.chunk_index)),
            "TotalChunks" => Some(Value::Number(self.total_chunks)),
            _ => None,
        }
    }
}

enum Value<'a> {
    Number(u32),
    Text(&'a str),
}

/// Render `template`, failing on any construct the evaluator does not know
pub fn render(template: &str, vars: &SubjectVars) -> Option<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open.find("}}")?;
        let action = after_open[..close].trim();
        out.push_str(&eval_action(action, vars)?);
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    Some(out)
}

/// Evaluate `.Name` or `printf "%0Nd" .Name`
fn eval_action(action: &str, vars: &SubjectVars) -> Option<String> {
    if let Some(name) = action.strip_prefix('.') {
        return match vars.lookup(name.trim())? {
            Value::Number(n) => Some(n.to_string()),
            Value::Text(s) => Some(s.to_string()),
        };
    }

    if let Some(args) = action.strip_prefix("printf") {
        let args = args.trim();
        let format = args.strip_prefix('"')?;
        let (format, rest) = format.split_once('"')?;
        let name = rest.trim().strip_prefix('.')?;
        let width = parse_decimal_format(format)?;
        let Value::Number(n) = vars.lookup(name.trim())? else {
            return None;
        };
        return Some(format!("{:0width$}", n, width = width));
    }

    None
}

/// Accept `%d`, `%2d`, `%02d` style verbs; returns the pad width
fn parse_decimal_format(format: &str) -> Option<usize> {
    let digits = format.strip_prefix('%')?.strip_suffix('d')?;
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// Fixed fallback format used when the template cannot be rendered
pub fn fallback(vars: &SubjectVars) -> String {
    format!(
        "({:02}/{:02}) - {} - ({}) yEnc ({:04}/{:04})",
        vars.index, vars.total, vars.filename, vars.size, vars.chunk_index, vars.total_chunks
    )
}

/// Human-readable size: one decimal for KB and above, plain bytes below
pub fn human_size(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const KIB: f64 = 1024.0;

    let size = bytes as f64;
    if size >= GIB {
        format!("{:.1}GB", size / GIB)
    } else if size >= MIB {
        format!("{:.1}MB", size / MIB)
    } else if size >= KIB {
        format!("{:.1}KB", size / KIB)
    } else {
        format!("{}B", bytes)
    }
}
