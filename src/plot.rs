use serde::Serialize;
use std::{collections::HashSet, path::Path};
use tracing::{info, warn};

use crate::{
    encode::ColumnMaps,
    error::PlotError,
    merge::merge,
    process::{LoadDiagnostics, LoadedTable, Loader},
    session::{LabelDictionary, SessionBacking, SessionCache, SessionMaps},
};

/// What a successful plot produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSummary {
    pub points: usize,
    /// Columns taken from the coordinates file.
    pub coord_cols: usize,
    pub labels: Vec<String>,
    pub categorical: Vec<bool>,
    pub diagnostics: LoadDiagnostics,
}

/// Load coordinates and the selected metadata labels, merge them and store
/// the result in `cache`.
///
/// The cache is only written once every step has succeeded.
pub fn plot<B: SessionBacking>(
    cache: &mut SessionCache<B>,
    loader: &Loader,
    coords_path: &Path,
    obs_path: &Path,
    labels: &[String],
) -> Result<PlotSummary, PlotError> {
    if labels.is_empty() {
        return Err(PlotError::NoLabels);
    }

    let coords = loader
        .load(coords_path, None)
        .map_err(|source| PlotError::Load {
            which: "coordinates",
            source,
        })?;
    if coords
        .maps
        .iter()
        .any(|m| matches!(m, ColumnMaps::Categorical(c) if !c.is_empty()))
    {
        warn!("coordinates file has categorical columns; they are kept as codes");
    }
    let obs = loader
        .load(obs_path, Some(labels))
        .map_err(|source| PlotError::Load {
            which: "metadata",
            source,
        })?;

    let maps = label_maps(&obs, labels);
    let merged = merge(&coords, &obs)?;
    let diagnostics = coords.diagnostics.combine(obs.diagnostics);

    let summary = PlotSummary {
        points: merged.matrix.rows(),
        coord_cols: merged.left_cols,
        labels: labels.to_vec(),
        categorical: obs.is_categorical(),
        diagnostics,
    };
    cache.store(merged.matrix, labels.to_vec(), maps)?;

    info!(
        points = summary.points,
        labels = summary.labels.len(),
        "loaded data with {} labels",
        summary.labels.len()
    );
    Ok(summary)
}

/// `headers` without repeats, first occurrence kept. A label names one
/// column, so repeated header names would load the first column twice.
pub fn distinct_labels(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(headers.len());
    let labels: Vec<String> = headers
        .iter()
        .filter(|h| seen.insert(h.as_str()))
        .cloned()
        .collect();
    if labels.len() < headers.len() {
        warn!(
            "{} repeated header names dropped from the labels",
            headers.len() - labels.len()
        );
    }
    labels
}

/// Per-label maps, taken from the loaded column at the label's position.
fn label_maps(obs: &LoadedTable, labels: &[String]) -> SessionMaps {
    let mut maps = SessionMaps::default();
    for ((label, column), extra) in labels.iter().zip(&obs.columns).zip(&obs.maps) {
        maps.obs_map.insert(label.clone(), column.kind.is_categorical());
        let dict = match extra {
            ColumnMaps::Categorical(cats) => LabelDictionary::Categorical(cats.clone()),
            ColumnMaps::Numeric(levels) => LabelDictionary::Numeric(levels.clone()),
        };
        maps.cat_map.insert(label.clone(), dict);
    }
    maps
}
