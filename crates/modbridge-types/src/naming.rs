//! Naming rules for module-declared types.
//!
//! Modules are written in arbitrary languages, so the names they declare arrive
//! in arbitrary case styles. The composed schema uses `CamelCase` for object,
//! interface and enum names and `lowerCamelCase` for fields, functions and
//! arguments; the original spelling is kept alongside so values can be handed
//! back to module code under the names it expects.

/// Object/interface names: capitalized camel case.
pub fn gql_object_name(name: &str) -> String {
    to_camel(name)
}

/// Field and function names: lower camel case.
pub fn gql_field_name(name: &str) -> String {
    to_lower_camel(name)
}

/// Argument names: lower camel case.
pub fn gql_arg_name(name: &str) -> String {
    to_lower_camel(name)
}

/// Prefix `obj_name` with the module `namespace`.
///
/// The main module object is already named after the module and is left alone.
pub fn namespace_object(obj_name: &str, namespace: &str) -> String {
    if gql_object_name(obj_name) == gql_object_name(namespace) {
        return obj_name.to_string();
    }
    gql_object_name(&format!("{}_{}", namespace, obj_name))
}

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | ' ' | '.')
}

/// `my_object` -> `MyObject`, `http-server2go` -> `HttpServer2Go`.
pub fn to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut cap_next = true;
    for c in s.trim().chars() {
        if is_separator(c) {
            cap_next = true;
            continue;
        }
        if c.is_ascii_digit() {
            out.push(c);
            cap_next = true;
            continue;
        }
        if cap_next {
            out.extend(c.to_uppercase());
            cap_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `MyObject` -> `myObject`, `ID` -> `id`, `HTTPServer` -> `httpServer`.
///
/// Only the first word is lowered. Later words keep their capital, so `i_d`
/// becomes `iD`, and a name starting with a separator has no first word:
/// `_id` becomes `Id`.
pub fn to_lower_camel(s: &str) -> String {
    let s = s.trim();
    if s.starts_with(is_separator) {
        return to_camel(s);
    }
    let word_end = s
        .find(|c: char| is_separator(c) || c.is_ascii_digit())
        .unwrap_or(s.len());
    let (head, rest) = s.split_at(word_end);

    let chars: Vec<char> = head.chars().collect();
    let upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();

    // a leading acronym keeps its last capital when a lowercase letter follows
    let lower_len = match upper_run {
        0 => 0,
        n if n == chars.len() => n,
        1 => 1,
        n if chars[n].is_lowercase() => n - 1,
        n => n,
    };

    let mut out = String::with_capacity(s.len());
    for (i, c) in chars.iter().enumerate() {
        if i < lower_len {
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out.push_str(&to_camel(rest));
    out
}
