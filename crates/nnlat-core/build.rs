const SETTINGS_PATH: &str = "src/default_settings.toml";

fn main() {
    println!("cargo:rerun-if-changed={SETTINGS_PATH}");
    check_default_settings(include_str!("src/default_settings.toml"));
}

/// The embedded defaults must parse and carry a usable `[decoding]` table,
/// since `settings::default_config` cannot report errors at runtime.
fn check_default_settings(content: &str) {
    let value: toml::Value = content
        .parse()
        .unwrap_or_else(|e| panic!("{SETTINGS_PATH} contains invalid TOML: {e}"));
    let decoding = value
        .get("decoding")
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("{SETTINGS_PATH} has no [decoding] table"));
    match decoding.get("nnlm_weight").and_then(toml::Value::as_float) {
        Some(w) if (0.0..=1.0).contains(&w) => {}
        _ => panic!("{SETTINGS_PATH}: decoding.nnlm_weight must be a float in [0, 1]"),
    }
}
