use outreach_core::{Config, Paths};
use serde_json::Value;

/// Show the effective configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let mut json = serde_json::to_value(&config)?;
    if let Some(token) = json.pointer_mut("/gateway/apiToken") {
        if token.is_string() {
            *token = Value::String("********".to_string());
        }
    }

    println!();
    println!("Current configuration");
    println!("  File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub async fn init(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let path = paths.config_file();
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    paths.ensure_dirs()?;
    Config::default().save(&path)?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(())
}

pub async fn get(key: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let json = serde_json::to_value(&config)?;

    match resolve_json_path(&json, key) {
        Some(Value::String(s)) => println!("{}", s),
        Some(v) => println!("{}", serde_json::to_string_pretty(&v)?),
        None => anyhow::bail!("Key '{}' not found in config", key),
    }
    Ok(())
}

pub async fn set(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let mut json = serde_json::to_value(&config)?;

    // Try to parse value as JSON, fall back to string
    let parsed: Value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    set_json_path(&mut json, key, parsed.clone());

    let new_config: Config = serde_json::from_value(json)?;
    new_config.validate()?;
    new_config.save(&paths.config_file())?;

    match parsed {
        Value::String(s) => println!("✓ Set {} = {}", key, s),
        other => println!("✓ Set {} = {}", key, serde_json::to_string(&other)?),
    }
    Ok(())
}

/// Resolve a dot-separated path, accepting snake_case segments for camelCase keys.
fn resolve_json_path(json: &Value, path: &str) -> Option<Value> {
    let mut current = json;
    for part in path.split('.') {
        current = current
            .get(to_camel_case(part))
            .or_else(|| current.get(part))?;
    }
    Some(current.clone())
}

fn set_json_path(json: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = json;
    for (i, part) in parts.iter().enumerate() {
        let camel = to_camel_case(part);
        let key = if current.get(&camel).is_some() {
            camel
        } else {
            part.to_string()
        };

        if i == parts.len() - 1 {
            current[&key] = value;
            return;
        }

        if current.get(&key).map(Value::is_object) != Some(true) {
            current[&key] = serde_json::json!({});
        }
        current = &mut current[&key];
    }
}

fn to_camel_case(s: &str) -> String {
    let mut result = String::new();
    let mut capitalize_next = false;
    for ch in s.chars() {
        if ch == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(ch.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}
