//! Model-name normalization against the catalog's canonical names

/// Fixed alias table mapping names seen in requests (and Azure deployment
/// names) to the catalog's canonical model names.
const ALIASES: &[(&str, &str)] = &[
    ("gemini-pro", "gemini-1.5-pro"),
    ("gemini-flash", "gemini-1.5-flash"),
    ("claude-3-5-sonnet-20241022", "claude-3.5-sonnet"),
    ("claude-3-5-haiku-20241022", "claude-3.5-haiku"),
    ("gpt-4-turbo-preview", "gpt-4-turbo"),
    ("gpt-4o-2024-08-06", "gpt-4o"),
];

/// Known model substrings used to recover a catalog name from Azure
/// deployment names like `my-gpt-4o-deployment`.
const KNOWN_MODEL_SUBSTRINGS: &[&str] = &[
    "gpt-5",
    "gpt-4o-mini",
    "gpt-4o",
    "gpt-4-turbo",
    "gpt-4",
    "gpt-3.5-turbo",
    "o3-mini",
    "o3",
    "o1-mini",
    "o1",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "grok-4",
    "grok-3",
    "qwen-max",
    "deepseek-r1",
];

/// Normalize a requested model name to the catalog's canonical form.
pub fn normalize_model_name(model: &str) -> String {
    let trimmed = model.trim();

    for (alias, canonical) in ALIASES {
        if trimmed.eq_ignore_ascii_case(alias) {
            return (*canonical).to_string();
        }
    }

    // Azure deployment names embed the model name; map any name containing
    // a known model substring to that model.
    let lower = trimmed.to_lowercase();
    for known in KNOWN_MODEL_SUBSTRINGS {
        if lower != *known && lower.contains(known) {
            return (*known).to_string();
        }
    }

    trimmed.to_string()
}

/// Find `model` in the catalog: exact normalized name first, then
/// case-insensitive substring inclusion in either direction.
pub fn lookup<'a, V>(
    data: &'a std::collections::HashMap<String, V>,
    model: &str,
) -> Option<(&'a str, &'a V)> {
    let normalized = normalize_model_name(model);

    if let Some((name, entry)) = data.get_key_value(&normalized) {
        return Some((name.as_str(), entry));
    }

    let needle = normalized.to_lowercase();
    data.iter()
        .find(|(name, _)| {
            let hay = name.to_lowercase();
            hay.contains(&needle) || needle.contains(&hay)
        })
        .map(|(name, entry)| (name.as_str(), entry))
}
