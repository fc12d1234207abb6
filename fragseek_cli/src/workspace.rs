//! Project workspace output.
//!
//! One directory per run:
//!
//! ```text
//! <root>/
//!   profiles/<name>.json      profile snapshot used for the run
//!   scores.csv                all experiments, all ranks
//!   <experiment-id>/
//!     summary.csv             ranked table for this experiment
//!     trees/<rank>_<formula>.json
//!     trees/<rank>_<formula>.dot
//! ```

use std::fs;
use std::path::{
    Path,
    PathBuf,
};

use fragseek::{
    IdentificationResult,
    Profile,
};

use crate::errors::CliError;

pub struct WorkspaceWriter {
    root: PathBuf,
    scores: Vec<ScoreRow>,
}

struct ScoreRow {
    experiment: String,
    rank: usize,
    formula: String,
    ionization: String,
    score: f64,
}

impl WorkspaceWriter {
    pub fn create(root: &Path) -> Result<Self, CliError> {
        fs::create_dir_all(root.join("profiles")).map_err(|e| io_error(e, root))?;
        Ok(Self {
            root: root.to_path_buf(),
            scores: Vec::new(),
        })
    }

    pub fn write_profile(&self, name: &str, profile: &Profile) -> Result<(), CliError> {
        let path = self.root.join("profiles").join(format!("{}.json", name));
        let json = serde_json::to_string_pretty(profile)?;
        fs::write(&path, json).map_err(|e| io_error(e, &path))
    }

    /// Write one experiment's trees and summary, and remember its rows for
    /// the run-wide scores table.
    pub fn write_results(
        &mut self,
        experiment_id: &str,
        results: &[IdentificationResult],
    ) -> Result<(), CliError> {
        let experiment_dir = self.root.join(experiment_id);
        let trees_dir = experiment_dir.join("trees");
        fs::create_dir_all(&trees_dir).map_err(|e| io_error(e, &trees_dir))?;

        let summary_path = experiment_dir.join("summary.csv");
        let mut summary = csv::Writer::from_path(&summary_path)
            .map_err(|e| csv_error(e, &summary_path))?;
        summary
            .write_record([
                "rank",
                "formula",
                "ionization",
                "overallScore",
                "treeSize",
                "explainedIntensity",
                "isotopeScore",
            ])
            .map_err(|e| csv_error(e, &summary_path))?;

        for result in results {
            let formula = result.formula.to_string();
            summary
                .write_record([
                    result.rank.to_string(),
                    formula.clone(),
                    result.ion_type.to_string(),
                    format!("{:.6}", result.score),
                    result.tree_size().to_string(),
                    format!("{:.4}", result.explained_intensity()),
                    result
                        .isotope_score()
                        .map(|s| format!("{:.6}", s))
                        .unwrap_or_default(),
                ])
                .map_err(|e| csv_error(e, &summary_path))?;

            if let Some(tree) = &result.tree {
                let stem = format!("{}_{}", result.rank, formula);
                let json_path = trees_dir.join(format!("{}.json", stem));
                fs::write(&json_path, tree.to_json()?).map_err(|e| io_error(e, &json_path))?;
                let dot_path = trees_dir.join(format!("{}.dot", stem));
                fs::write(&dot_path, tree.to_dot()).map_err(|e| io_error(e, &dot_path))?;
            }

            self.scores.push(ScoreRow {
                experiment: experiment_id.to_string(),
                rank: result.rank,
                formula,
                ionization: result.ion_type.to_string(),
                score: result.score,
            });
        }
        summary.flush().map_err(|e| io_error(e, &summary_path))?;
        Ok(())
    }

    /// Write the run-wide scores table. Call once after every experiment
    /// went through.
    pub fn finish(&self) -> Result<(), CliError> {
        let path = self.root.join("scores.csv");
        let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_error(e, &path))?;
        writer
            .write_record(["experiment", "rank", "formula", "ionization", "overallScore"])
            .map_err(|e| csv_error(e, &path))?;
        for row in &self.scores {
            writer
                .write_record([
                    row.experiment.clone(),
                    row.rank.to_string(),
                    row.formula.clone(),
                    row.ionization.clone(),
                    format!("{:.6}", row.score),
                ])
                .map_err(|e| csv_error(e, &path))?;
        }
        writer.flush().map_err(|e| io_error(e, &path))
    }
}

fn io_error(e: std::io::Error, path: &Path) -> CliError {
    CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    }
}

fn csv_error(e: csv::Error, path: &Path) -> CliError {
    CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use fragcore::{
        MolecularFormula,
        PrecursorIonType,
    };
    use fragseek::IdentificationResult;

    use super::*;

    #[test]
    fn workspace_layout_is_written() {
        let root = std::env::temp_dir().join(format!(
            "fragseek-workspace-test-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);

        let mut writer = WorkspaceWriter::create(&root).unwrap();
        writer.write_profile("qtof", &Profile::qtof()).unwrap();
        let result = IdentificationResult::infeasible(
            MolecularFormula::parse("C6H12O6").unwrap(),
            PrecursorIonType::parse("[M+H]+").unwrap(),
        );
        writer.write_results("glucose", &[result]).unwrap();
        writer.finish().unwrap();

        assert!(root.join("profiles/qtof.json").is_file());
        assert!(root.join("glucose/summary.csv").is_file());
        assert!(root.join("scores.csv").is_file());
        let summary = fs::read_to_string(root.join("glucose/summary.csv")).unwrap();
        assert!(summary.starts_with("rank,formula,ionization"));

        let _ = fs::remove_dir_all(&root);
    }
}
