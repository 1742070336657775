use mdforge::engine::config::{Isolation, MoleculeFilter, QuantitySelection};

pub struct DefaultsConfig {
    pub batch_size: usize,
    pub workers: usize,
    pub isolation: Isolation,
    pub temperatures: Vec<u32>,
    pub replicas: usize,
    pub filter: MoleculeFilter,
    pub analysis_threads: usize,
    pub prefix: String,
    pub extension: String,
    pub layout: String,
    pub position_suffix: String,
    pub force_suffix: String,
    pub molecule_selection: QuantitySelection,
    pub replica_selection: QuantitySelection,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            workers: 1,
            isolation: Isolation::Process,
            temperatures: vec![320, 348, 379, 413, 450],
            replicas: 5,
            filter: MoleculeFilter::Protein,
            analysis_threads: 1,
            prefix: "mdforge_dataset".to_string(),
            extension: "json.zst".to_string(),
            layout: "mdforge-protein-only".to_string(),
            position_suffix: ".traj.dcd".to_string(),
            force_suffix: ".force.dcd".to_string(),
            molecule_selection: QuantitySelection::molecule_default(),
            replica_selection: QuantitySelection::replica_default(),
        }
    }
}
