//! Best-effort repair of model output into parseable JSON.
//!
//! Models wrap JSON in code fences and prose, leave trailing commas, use
//! Python literals, or stop mid-object. `repair_json` fixes those before a
//! strict `serde_json` parse; it never guarantees the result parses.

/// Extracts the body of the first ```json (or bare ```) fence, if any.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let (start, tag_len) = match text.find("```json") {
        Some(pos) => (pos, "```json".len()),
        None => match text.find("```") {
            Some(pos) => (pos, "```".len()),
            None => return text,
        },
    };
    let body = &text[start + tag_len..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Returns the repaired JSON text of the first object or array in `raw`.
pub fn repair_json(raw: &str) -> String {
    let text = strip_json_fences(raw);
    let start = match text.find(|c: char| c == '{' || c == '[') {
        Some(pos) => pos,
        None => return text.to_string(),
    };

    let mut out = String::with_capacity(text.len());
    let mut closers: Vec<char> = Vec::new();
    let mut chars = text[start..].chars().peekable();
    // Some(quote) while inside a string opened by `quote`.
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                c if c == quote => {
                    out.push('"');
                    in_string = None;
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                out.push('"');
                in_string = Some(c);
            }
            '{' => {
                out.push(c);
                closers.push('}');
            }
            '[' => {
                out.push(c);
                closers.push(']');
            }
            '}' | ']' => {
                if closers.last() == Some(&c) {
                    drop_trailing_comma(&mut out);
                    out.push(c);
                    closers.pop();
                    if closers.is_empty() {
                        break;
                    }
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }

    if in_string.is_some() {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        drop_trailing_comma(&mut out);
        if out.trim_end().ends_with(':') {
            out.push_str(" null");
        }
        out.push(closer);
    }

    out
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(',') {
        out.truncate(trimmed - 1);
    }
}
