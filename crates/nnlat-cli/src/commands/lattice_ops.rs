use std::path::Path;

use nnlat_core::lattice::slf::read_slf_file;

pub fn lattice_info(file: &str) {
    let lattice = die!(read_slf_file(Path::new(file)), "Error reading {file}: {}");
    let order = die!(lattice.sorted_nodes(), "Error: {}");

    println!(
        "Utterance:      {}",
        lattice.utterance_id.as_deref().unwrap_or("-")
    );
    println!("Nodes:          {}", lattice.num_nodes());
    println!("Links:          {}", lattice.num_links());
    println!(
        "Null links:     {}",
        lattice.links().iter().filter(|l| l.is_null()).count()
    );
    let show = |v: Option<f64>| v.map_or("-".to_string(), |v| v.to_string());
    println!("LM scale:       {}", show(lattice.lm_scale));
    println!("WI penalty:     {}", show(lattice.wi_penalty));
    println!(
        "Initial/final:  {} / {}",
        die!(lattice.initial_node(), "Error: {}"),
        die!(lattice.final_node(), "Error: {}")
    );
    println!(
        "Entry nodes:    {}",
        lattice.nodes().iter().filter(|n| n.in_links.is_empty()).count()
    );
    let order: Vec<String> = order.iter().map(|id| id.to_string()).collect();
    println!("Order:          {}", order.join(" "));
}
