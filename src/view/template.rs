//! Placeholder substitution and escaping.

use serde_json::Value;

use super::Locals;

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn local_text(locals: &Locals, key: &str) -> String {
    match locals.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Replace `{{ key }}` with the escaped local and `{{{ key }}}` with the raw
/// one. Unknown keys render as empty; an unterminated tag is left as text.
pub fn substitute(template: &str, locals: &Locals) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let (raw, open, close) = if after.starts_with("{{{") {
            (true, 3, "}}}")
        } else {
            (false, 2, "}}")
        };

        match after[open..].find(close) {
            Some(end) => {
                let key = after[open..open + end].trim();
                let text = local_text(locals, key);
                if raw {
                    out.push_str(&text);
                } else {
                    out.push_str(&escape_html(&text));
                }
                rest = &after[open + end + close.len()..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn test_substitute() {
        let locals = json!({"n": 3, "html": "<b>", "s": "x"}).as_object().cloned().unwrap();
        assert_eq!(substitute("{{n}}-{{ html }}-{{{ html }}}-{{missing}}", &locals), "3-&lt;b&gt;-<b>-");
        assert_eq!(substitute("open {{ s", &locals), "open {{ s");
        assert_eq!(substitute("no tags", &locals), "no tags");
    }
}
