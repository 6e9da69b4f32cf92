//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Remove a surrounding markdown code fence (```json ... ```) if the model added one.
pub fn strip_code_fence(s: &str) -> &str {
  let t = s.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  let Some(inner) = rest.strip_suffix("```") else { return t };
  // Drop an optional language tag on the opening line.
  match inner.find('\n') {
    Some(nl) if !inner[..nl].trim().contains('{') => inner[nl + 1..].trim(),
    _ => inner.trim(),
  }
}

/// Render a number the way a person would write an answer: no trailing ".0".
pub fn format_answer(n: f64) -> String {
  if n.fract() == 0.0 && n.abs() < 1e15 {
    format!("{}", n as i64)
  } else {
    format!("{}", n)
  }
}

/// Log-safe truncation for large strings (char-boundary aware).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}
