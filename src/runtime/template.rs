/// `{{variable}}` substitution against the execution context
///
/// Placeholders accept dotted paths (`{{ llm-1.response }}`). String values are
/// inserted raw, any other value as compact JSON. Placeholders that do not
/// resolve are left in place so the author can see what was missing.

use crate::runtime::context::ExecutionContext;
use serde_json::Value;

/// Render a template against the context
pub fn render(template: &str, ctx: &ExecutionContext) -> String {
    render_with(template, |path| ctx.get_path(path).map(value_to_text))
}

/// Render a template with a custom resolver
pub fn render_with<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };

        let path = after_open[..end].trim();
        match resolve(path) {
            Some(text) if !path.is_empty() => output.push_str(&text),
            _ => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    output
}

/// Text form of a context value used for substitution
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.set("topic", json!("rust"));
        ctx.set("count", json!(3));
        ctx.set("search", json!({"results": [{"title": "The Book"}]}));
        ctx
    }

    #[test]
    fn test_strings_are_raw_and_values_are_json() {
        let rendered = render("Write {{count}} posts about {{ topic }}", &ctx());
        assert_eq!(rendered, "Write 3 posts about rust");
        assert_eq!(render("{{search.results}}", &ctx()), r#"[{"title":"The Book"}]"#);
        assert_eq!(render("{{search.results.0.title}}", &ctx()), "The Book");
    }

    #[test]
    fn test_unresolved_and_unterminated_placeholders_are_kept() {
        assert_eq!(render("Hello {{name}}!", &ctx()), "Hello {{name}}!");
        assert_eq!(render("{{}} and {{topic", &ctx()), "{{}} and {{topic");
    }
}
