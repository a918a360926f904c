/// Map a relative route template to an OpenAPI path key.
///
/// `todos/{id:int}` → `/todos/{id}`, `{id=5}` → `{id}`, `{id?}` → `{id}`,
/// `{*rest}` and `{**rest}` → `{rest}`. A trailing slash is dropped.
pub fn normalize_route_template(route: &str) -> String {
    let trimmed = route.trim().trim_start_matches('~').trim_matches('/');

    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push('/');
    let mut rest = trimmed;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            // unbalanced brace, keep verbatim
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        out.push('{');
        out.push_str(parameter_name(&after[..close]));
        out.push('}');
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Names of the `{...}` segments of an already normalized path.
pub fn path_parameter_names(path: &str) -> Vec<&str> {
    path.split('{')
        .skip(1)
        .filter_map(|part| part.split_once('}').map(|(name, _)| name))
        .collect()
}

fn parameter_name(token: &str) -> &str {
    let token = token.trim_start_matches('*');
    let end = token.find([':', '=', '?']).unwrap_or(token.len());
    token[..end].trim()
}
