use std::path::Path;

use nnlat_core::settings;

pub fn settings_export() {
    print!("{}", settings::default_toml());
}

pub fn settings_validate(file: &str) {
    let c = die!(
        settings::load_settings_file(Path::new(file)),
        "Error in {file}: {}"
    );
    let opt = |v: Option<f64>| v.map_or("lattice".to_string(), |v| v.to_string());
    println!(
        "OK: nnlm_weight={}, lm_scale={}, wi_penalty={}, beam={}, max_tokens_per_node={}, recombination_order={}",
        c.nnlm_weight,
        opt(c.lm_scale),
        opt(c.wi_penalty),
        c.beam.map_or("off".to_string(), |b| b.to_string()),
        c.max_tokens_per_node.map_or("off".to_string(), |n| n.to_string()),
        c.recombination_order.map_or("full".to_string(), |n| n.to_string()),
    );
}
