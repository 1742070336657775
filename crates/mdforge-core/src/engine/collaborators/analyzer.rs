use super::{AnalyzerFactory, COORDS, FORCES, MoleculeAnalyzer, TrajectoryKind};
use crate::core::archive::{ArchiveError, AttrValue, Dataset};
use crate::core::io::dcd::{DcdFrame, DcdTrajectory};
use crate::core::io::pdb::{PdbAtom, PdbStructure};
use crate::core::utils::{chemistry, geometry};
use crate::engine::config::MoleculeFilter;
use crate::engine::error::{AnalysisError, PipelineError};
use nalgebra::Point3;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

fn accepts(filter: MoleculeFilter, atom: &PdbAtom) -> bool {
    match filter {
        MoleculeFilter::All => true,
        MoleculeFilter::Protein => chemistry::is_protein_residue(&atom.residue_name),
        MoleculeFilter::ProteinHeavy => {
            chemistry::is_protein_residue(&atom.residue_name)
                && !chemistry::is_hydrogen(&atom.element)
        }
    }
}

fn quantity(name: &'static str) -> impl FnOnce(ArchiveError) -> AnalysisError {
    move |source| AnalysisError::Quantity { name, source }
}

/// Opens PDB structures and hands out [`StructureAnalyzer`]s that share one analysis
/// thread pool.
pub struct StructureAnalyzerFactory {
    filter: MoleculeFilter,
    pool: Arc<ThreadPool>,
}

impl StructureAnalyzerFactory {
    pub fn new(filter: MoleculeFilter, threads: usize) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mdforge-analysis-{}", i))
            .build()
            .map_err(|e| {
                PipelineError::Worker(format!("Failed to create analysis thread pool: {}", e))
            })?;
        Ok(Self {
            filter,
            pool: Arc::new(pool),
        })
    }
}

impl AnalyzerFactory for StructureAnalyzerFactory {
    type Analyzer = StructureAnalyzer;

    fn open(&self, structure: &Path) -> Result<StructureAnalyzer, AnalysisError> {
        let pdb =
            PdbStructure::read_from_path(structure).map_err(|source| AnalysisError::Structure {
                path: structure.to_path_buf(),
                source,
            })?;

        let selection: Vec<usize> = pdb
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| accepts(self.filter, atom))
            .map(|(i, _)| i)
            .collect();
        if selection.is_empty() {
            return Err(AnalysisError::EmptySelection {
                path: structure.to_path_buf(),
                filter: self.filter.to_string(),
            });
        }

        let masses = selection
            .iter()
            .map(|&i| chemistry::atomic_mass(&pdb.atoms[i].element).unwrap_or(0.0))
            .collect();

        debug!(
            structure = %structure.display(),
            atoms = pdb.len(),
            selected = selection.len(),
            "Opened structure."
        );

        Ok(StructureAnalyzer {
            source: structure.to_path_buf(),
            structure: pdb,
            selection,
            masses,
            pool: Arc::clone(&self.pool),
            properties_computed: false,
            molecule: Quantities::default(),
            replica: Quantities::default(),
            position_frames: Vec::new(),
            force_frames: Vec::new(),
        })
    }
}

#[derive(Debug, Default)]
struct Quantities {
    attrs: BTreeMap<String, AttrValue>,
    datasets: BTreeMap<String, Dataset>,
}

impl Quantities {
    fn clear(&mut self) {
        self.attrs.clear();
        self.datasets.clear();
    }
}

/// Topology quantities from a PDB structure, plus coordinates, forces and derived
/// geometry from DCD trajectories of the selected atoms.
pub struct StructureAnalyzer {
    source: PathBuf,
    structure: PdbStructure,
    selection: Vec<usize>,
    masses: Vec<f64>,
    pool: Arc<ThreadPool>,
    properties_computed: bool,
    molecule: Quantities,
    replica: Quantities,
    position_frames: Vec<DcdFrame>,
    force_frames: Vec<Vec<[f32; 3]>>,
}

impl StructureAnalyzer {
    pub fn num_selected_atoms(&self) -> usize {
        self.selection.len()
    }

    /// Reads all frames of `files`, reduced to the selected atoms.
    fn load_frames(&self, files: &[PathBuf]) -> Result<Vec<DcdFrame>, AnalysisError> {
        let total = self.structure.len();
        let selected = self.selection.len();
        let mut frames = Vec::new();

        for path in files {
            let trajectory =
                DcdTrajectory::read_from_path(path).map_err(|source| AnalysisError::Trajectory {
                    path: path.clone(),
                    source,
                })?;

            let reduce = if trajectory.num_atoms == total {
                selected != total
            } else if trajectory.num_atoms == selected {
                false
            } else {
                return Err(AnalysisError::AtomCountMismatch {
                    path: path.clone(),
                    expected: total,
                    selected,
                    found: trajectory.num_atoms,
                });
            };

            frames.extend(trajectory.frames.into_iter().map(|frame| {
                if reduce {
                    DcdFrame {
                        unit_cell: frame.unit_cell,
                        positions: self.selection.iter().map(|&i| frame.positions[i]).collect(),
                    }
                } else {
                    frame
                }
            }));
        }
        Ok(frames)
    }

    fn update_position_quantities(&mut self) -> Result<(), AnalysisError> {
        for name in [COORDS, "box", "gyrationRadius", "rmsd", "rmsf"] {
            self.replica.datasets.remove(name);
        }
        self.replica.attrs.remove("numFrames");
        if self.position_frames.is_empty() {
            return Ok(());
        }

        let n_frames = self.position_frames.len();
        let n_atoms = self.selection.len();

        let flat: Vec<f32> = self
            .position_frames
            .iter()
            .flat_map(|frame| frame.positions.iter().flatten().copied())
            .collect();
        let coords = Dataset::float32(vec![n_frames, n_atoms, 3], flat).map_err(quantity(COORDS))?;

        let boxes: Option<Vec<f32>> = self
            .position_frames
            .iter()
            .map(|frame| frame.box_lengths())
            .try_fold(Vec::with_capacity(n_frames * 3), |mut acc, lengths| {
                acc.extend(lengths?.iter().map(|&v| v as f32));
                Some(acc)
            });

        let masses = &self.masses;
        let frames = &self.position_frames;
        let (gyration, rmsd, rmsf) = self.pool.install(|| {
            let points: Vec<Vec<Point3<f64>>> = frames
                .par_iter()
                .map(|frame| {
                    frame
                        .positions
                        .iter()
                        .map(|p| Point3::new(p[0] as f64, p[1] as f64, p[2] as f64))
                        .collect()
                })
                .collect();

            let gyration: Vec<f32> = points
                .par_iter()
                .map(|p| geometry::radius_of_gyration(p, masses) as f32)
                .collect();

            let reference = &points[0];
            let aligned: Vec<Vec<Point3<f64>>> = points
                .par_iter()
                .map(|p| geometry::superpose(reference, p))
                .collect();
            let rmsd: Vec<f32> = aligned
                .par_iter()
                .map(|p| geometry::rmsd(reference, p) as f32)
                .collect();
            let rmsf: Vec<f32> = geometry::rmsf(&aligned)
                .into_iter()
                .map(|v| v as f32)
                .collect();
            (gyration, rmsd, rmsf)
        });

        let datasets = &mut self.replica.datasets;
        datasets.insert(COORDS.to_string(), coords);
        match boxes {
            Some(values) => {
                let ds = Dataset::float32(vec![n_frames, 3], values).map_err(quantity("box"))?;
                datasets.insert("box".to_string(), ds);
            }
            None => debug!(
                source = %self.source.display(),
                "Trajectory frames carry no unit cell; box is not recorded."
            ),
        }
        datasets.insert(
            "gyrationRadius".to_string(),
            Dataset::float32(vec![n_frames], gyration).map_err(quantity("gyrationRadius"))?,
        );
        datasets.insert(
            "rmsd".to_string(),
            Dataset::float32(vec![n_frames], rmsd).map_err(quantity("rmsd"))?,
        );
        datasets.insert(
            "rmsf".to_string(),
            Dataset::float32(vec![n_atoms], rmsf).map_err(quantity("rmsf"))?,
        );
        self.replica
            .attrs
            .insert("numFrames".to_string(), AttrValue::from(n_frames));
        Ok(())
    }

    fn update_force_quantities(&mut self) -> Result<(), AnalysisError> {
        self.replica.datasets.remove(FORCES);
        if self.force_frames.is_empty() {
            return Ok(());
        }

        let n_frames = self.force_frames.len();
        if !self.position_frames.is_empty() && self.position_frames.len() != n_frames {
            warn!(
                source = %self.source.display(),
                positions = self.position_frames.len(),
                forces = n_frames,
                "Position and force trajectories differ in length."
            );
        }
        let flat: Vec<f32> = self
            .force_frames
            .iter()
            .flat_map(|frame| frame.iter().flatten().copied())
            .collect();
        let forces = Dataset::float32(vec![n_frames, self.selection.len(), 3], flat)
            .map_err(quantity(FORCES))?;
        self.replica.datasets.insert(FORCES.to_string(), forces);
        Ok(())
    }
}

impl MoleculeAnalyzer for StructureAnalyzer {
    fn compute_properties(&mut self) -> Result<(), AnalysisError> {
        if self.properties_computed {
            return Ok(());
        }

        let atoms: Vec<&PdbAtom> = self
            .selection
            .iter()
            .map(|&i| &self.structure.atoms[i])
            .collect();
        let n_atoms = atoms.len();

        let mut seen_residues = HashSet::new();
        let mut sequence = String::new();
        let mut chains: Vec<char> = Vec::new();
        for atom in &atoms {
            let key = (atom.chain_id, atom.residue_number, atom.insertion_code);
            if seen_residues.insert(key) {
                sequence.push(chemistry::one_letter_code(&atom.residue_name).unwrap_or('X'));
            }
            if !chains.contains(&atom.chain_id) {
                chains.push(atom.chain_id);
            }
        }

        let attrs = &mut self.molecule.attrs;
        attrs.insert("numProteinAtoms".to_string(), AttrValue::from(n_atoms));
        attrs.insert(
            "numResidues".to_string(),
            AttrValue::from(seen_residues.len()),
        );
        attrs.insert("numChains".to_string(), AttrValue::from(chains.len()));
        attrs.insert("sequence".to_string(), AttrValue::Text(sequence));

        let z: Vec<i64> = atoms
            .iter()
            .map(|a| chemistry::atomic_number(&a.element).unwrap_or(0))
            .collect();
        let resid: Vec<i64> = atoms.iter().map(|a| a.residue_number as i64).collect();
        let pdb_coords: Vec<f32> = atoms
            .iter()
            .flat_map(|a| a.position.map(|v| v as f32))
            .collect();

        let datasets = &mut self.molecule.datasets;
        datasets.insert(
            "z".to_string(),
            Dataset::int64(vec![n_atoms], z).map_err(quantity("z"))?,
        );
        datasets.insert(
            "element".to_string(),
            Dataset::text(atoms.iter().map(|a| a.element.clone()).collect()),
        );
        datasets.insert(
            "resname".to_string(),
            Dataset::text(atoms.iter().map(|a| a.residue_name.clone()).collect()),
        );
        datasets.insert(
            "resid".to_string(),
            Dataset::int64(vec![n_atoms], resid).map_err(quantity("resid"))?,
        );
        datasets.insert(
            "chain".to_string(),
            Dataset::text(atoms.iter().map(|a| a.chain_id.to_string()).collect()),
        );
        datasets.insert(
            "pdbCoords".to_string(),
            Dataset::float32(vec![n_atoms, 3], pdb_coords).map_err(quantity("pdbCoords"))?,
        );

        self.properties_computed = true;
        Ok(())
    }

    fn has_properties(&self) -> bool {
        self.properties_computed
    }

    fn reset_replica(&mut self) {
        self.replica.clear();
        self.position_frames.clear();
        self.force_frames.clear();
    }

    fn traj_analysis(
        &mut self,
        kind: TrajectoryKind,
        files: &[PathBuf],
    ) -> Result<(), AnalysisError> {
        let frames = self.load_frames(files)?;
        match kind {
            TrajectoryKind::Positions => {
                self.position_frames.extend(frames);
                self.update_position_quantities()
            }
            TrajectoryKind::Forces => {
                self.force_frames
                    .extend(frames.into_iter().map(|frame| frame.positions));
                self.update_force_quantities()
            }
        }
    }

    fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.replica
            .attrs
            .get(name)
            .or_else(|| self.molecule.attrs.get(name))
    }

    fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.replica
            .datasets
            .get(name)
            .or_else(|| self.molecule.datasets.get(name))
    }
}
