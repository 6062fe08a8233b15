//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AgoraConfig;
use agora_core::workers::compute_group_priorities;
use agora_core::{
    AgoraError, Board, CandidateSource, FeatureRegistry, ModelSpec, Point, Region, RunArchive,
    RunReport, RunSummary, Scheduler, form_groups,
    formats::MAX_SUMMARY_SIZE,
    primitives::MAX_REGION_AREA,
    summary_crypto_hash, summary_from_bytes, summary_to_bytes,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum model file size (16 MB).
const MAX_MODEL_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum ROI file size (64 MB).
///
/// Pixel lists grow quickly with region size.
const MAX_ROI_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), AgoraError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AgoraError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(AgoraError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and ensure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, AgoraError> {
    let canonical = path.canonicalize().map_err(|e| {
        AgoraError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(AgoraError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path, which must be a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, AgoraError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        AgoraError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(AgoraError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| AgoraError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// ROI DIRECTORY SOURCE
// =============================================================================

/// One region in an ROI file: a half-open rectangle or a pixel list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoiRegion {
    Rect { rect: [i32; 4] },
    Pixels { pixels: Vec<[i32; 2]> },
}

impl RoiRegion {
    /// Expand into a pixel set, refusing anything over [`MAX_REGION_AREA`].
    fn into_region(self) -> Result<Region, AgoraError> {
        match self {
            RoiRegion::Rect {
                rect: [x0, y0, x1, y1],
            } => Region::try_rect(x0, y0, x1, y1)
                .map_err(|e| AgoraError::DeserializationError(e.to_string())),
            RoiRegion::Pixels { pixels } => {
                if pixels.len() > MAX_REGION_AREA {
                    return Err(AgoraError::DeserializationError(format!(
                        "pixel list of {} entries, limit is {}",
                        pixels.len(),
                        MAX_REGION_AREA
                    )));
                }
                Ok(Region::from_pixels(
                    pixels.into_iter().map(|[x, y]| Point::new(x, y)),
                ))
            }
        }
    }
}

/// Reads `<roi_dir>/<entity>.json`, a JSON list of regions, for each entity.
///
/// The directory comes from the entity's own paths, then the board's, then
/// `fallback`. A missing file means no candidates.
#[derive(Debug, Clone, Default)]
pub struct RoiDirectory {
    fallback: Option<PathBuf>,
}

impl RoiDirectory {
    #[must_use]
    pub fn new(fallback: Option<PathBuf>) -> Self {
        Self { fallback }
    }

    fn directory_for(&self, board: &Board, entity: usize) -> Result<Option<PathBuf>, AgoraError> {
        Ok(board
            .paths_for(entity)?
            .roi_dir
            .or_else(|| self.fallback.clone()))
    }
}

impl CandidateSource for RoiDirectory {
    fn candidates_for(&self, board: &Board, entity: usize) -> Result<Vec<Region>, AgoraError> {
        let name = board.entity(entity)?.name();
        let Some(dir) = self.directory_for(board, entity)? else {
            tracing::warn!(entity = name, "no roi_dir configured");
            return Ok(Vec::new());
        };

        let file = dir.join(format!("{name}.json"));
        if !file.is_file() {
            tracing::debug!(entity = name, path = %file.display(), "no ROI file");
            return Ok(Vec::new());
        }
        validate_file_size(&file, MAX_ROI_FILE_SIZE)?;

        let data = std::fs::read(&file)
            .map_err(|e| AgoraError::IoError(format!("Read ROI file: {}", e)))?;
        let rois: Vec<RoiRegion> = serde_json::from_slice(&data).map_err(|e| {
            AgoraError::DeserializationError(format!("ROI file '{}': {}", file.display(), e))
        })?;

        tracing::debug!(entity = name, regions = rois.len(), "ROI file read");
        rois.into_iter()
            .map(RoiRegion::into_region)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| match e {
                AgoraError::DeserializationError(msg) => AgoraError::DeserializationError(
                    format!("ROI file '{}': {}", file.display(), msg),
                ),
                other => other,
            })
    }
}

// =============================================================================
// MODEL LOADING
// =============================================================================

/// Read and parse a model file.
pub fn load_model(path: &Path) -> Result<ModelSpec, AgoraError> {
    let validated_path = validate_file_path(path)?;
    validate_file_size(&validated_path, MAX_MODEL_FILE_SIZE)?;

    let text = std::fs::read_to_string(&validated_path)
        .map_err(|e| AgoraError::IoError(format!("Read model: {}", e)))?;
    toml::from_str(&text).map_err(|e| {
        AgoraError::DeserializationError(format!("Model '{}': {}", path.display(), e))
    })
}

/// Build a board from `model`. Model paths win over configured ones.
pub fn build_board(
    model: &ModelSpec,
    config: &AgoraConfig,
    features: &FeatureRegistry,
) -> Result<Board, AgoraError> {
    let mut board = model.build(features)?;
    let paths = config.paths.overlay(board.paths());
    board.set_paths(paths);
    Ok(board)
}

/// Parse `x0,y0,x1,y1` into a rectangle of at most [`MAX_REGION_AREA`] pixels.
pub fn parse_search_area(text: &str) -> Result<Region, AgoraError> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AgoraError::InvalidModel(format!("search area '{}': {}", text, e)))?;

    match values.as_slice() {
        [x0, y0, x1, y1] => Region::try_rect(*x0, *y0, *x1, *y1),
        _ => Err(AgoraError::InvalidModel(format!(
            "search area '{}' must be x0,y0,x1,y1",
            text
        ))),
    }
}

// =============================================================================
// SUMMARY FILES
// =============================================================================

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Write `summary` as JSON (`.json`) or the binary summary format.
pub fn write_summary_file(summary: &RunSummary, path: &Path) -> Result<(), AgoraError> {
    let validated_path = validate_output_path(path)?;
    let data = if is_json_path(path) {
        serde_json::to_vec_pretty(summary)
            .map_err(|e| AgoraError::SerializationError(format!("JSON summary: {}", e)))?
    } else {
        summary_to_bytes(summary)?
    };
    std::fs::write(&validated_path, &data)
        .map_err(|e| AgoraError::IoError(format!("Write summary: {}", e)))?;
    tracing::info!(path = %validated_path.display(), bytes = data.len(), "summary written");
    Ok(())
}

/// Read a summary file in either format.
pub fn read_summary_file(path: &Path) -> Result<RunSummary, AgoraError> {
    let validated_path = validate_file_path(path)?;
    validate_file_size(&validated_path, MAX_SUMMARY_SIZE as u64)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| AgoraError::IoError(format!("Read summary: {}", e)))?;

    if is_json_path(path) {
        serde_json::from_slice(&data)
            .map_err(|e| AgoraError::DeserializationError(format!("JSON summary: {}", e)))
    } else {
        summary_from_bytes(&data)
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn summary_json(summary: &RunSummary) -> serde_json::Value {
    let entities: Vec<_> = summary
        .entities
        .iter()
        .map(|e| {
            serde_json::json!({
                "name": e.name,
                "matched": e.matched_result.is_some(),
                "matched_indices": e.matched_indices,
                "matched_area": e.matched_result.as_ref().map(Region::area),
                "candidates": e.candidates.len(),
            })
        })
        .collect();
    let groups: Vec<_> = summary
        .groups
        .iter()
        .map(|g| {
            serde_json::json!({
                "members": g.members,
                "priority": g.priority,
                "terminal": g.terminal,
            })
        })
        .collect();

    serde_json::json!({
        "entities": entities,
        "groups": groups,
        "metrics": summary.metrics,
        "checksum": summary.checksum(),
    })
}

fn print_summary_text(summary: &RunSummary) {
    println!("Entities");
    println!("========");
    for entity in &summary.entities {
        match &entity.matched_result {
            Some(region) => println!(
                "  {:<24} matched {:?} ({} px)",
                entity.name,
                entity.matched_indices,
                region.area()
            ),
            None => println!("  {:<24} unmatched", entity.name),
        }
    }
    println!();
    println!("Groups");
    println!("======");
    for group in &summary.groups {
        let state = if group.terminal { "done" } else { "open" };
        println!(
            "  [{}] priority {:.3} {}",
            group.members.join(", "),
            group.priority,
            state
        );
    }
    println!();
    let m = &summary.metrics;
    println!("Entities:    {}", m.entity_count);
    println!("Groups:      {}", m.group_count);
    println!("Matched:     {}", m.matched_count);
    println!("Candidates:  {}", m.candidate_count);
    println!("Activations: {}", m.activation_count);
    println!("Checksum:    {:016x}", summary.checksum());
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Options of `agora run` beyond the model path.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub rois: Option<PathBuf>,
    pub search_area: Option<Region>,
    pub output: Option<PathBuf>,
    pub archive_as: Option<String>,
}

/// Load `model_path` and run the built-in workers to fixpoint.
pub fn run_model(
    config: &AgoraConfig,
    model_path: &Path,
    options: &RunOptions,
) -> Result<(Board, RunReport), AgoraError> {
    let features = Rc::new(FeatureRegistry::with_builtins());
    let model = load_model(model_path)?;
    let mut board = build_board(&model, config, &features)?;
    board.set_overall_search_area(options.search_area.clone());

    let source = RoiDirectory::new(options.rois.clone());
    let mut scheduler =
        Scheduler::with_builtin_workers(config.scheduler_config(), features, Box::new(source));
    let report = scheduler.run(&mut board)?;
    Ok((board, report))
}

/// Run a model and report the result.
pub fn cmd_run(
    config: &AgoraConfig,
    archive_path: &Path,
    json_mode: bool,
    model_path: &Path,
    options: &RunOptions,
) -> Result<(), AgoraError> {
    let (board, report) = run_model(config, model_path, options)?;
    let summary = RunSummary::from_board(&board);

    if let Some(output) = &options.output {
        write_summary_file(&summary, output)?;
    }
    if let Some(name) = &options.archive_as {
        RunArchive::open(archive_path)?.store(name, &summary)?;
    }

    if json_mode {
        let mut output = summary_json(&summary);
        output["report"] = serde_json::json!({
            "activations": report.activations,
            "per_worker": report.per_worker,
            "slow_activations": report.slow_activations,
        });
        print_json(&output);
        return Ok(());
    }

    println!("Agora Run");
    println!("=========");
    println!("Model: {:?}", model_path);
    println!();
    print_summary_text(&summary);
    println!();
    println!("Workers");
    println!("=======");
    for (worker, count) in &report.per_worker {
        println!("  {:<24} {}", worker, count);
    }
    if report.slow_activations > 0 {
        println!("  ({} activations over deadline)", report.slow_activations);
    }
    if let Some(name) = &options.archive_as {
        println!();
        println!("Archived as '{}' in {:?}", name, archive_path);
    }

    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate a model and show its groups and initial priorities.
pub fn cmd_check(config: &AgoraConfig, json_mode: bool, model_path: &Path) -> Result<(), AgoraError> {
    let features = FeatureRegistry::with_builtins();
    let model = load_model(model_path)?;
    let mut board = build_board(&model, config, &features)?;
    form_groups(&mut board)?;
    compute_group_priorities(&mut board)?;

    let groups: Vec<(Vec<String>, f64)> = board
        .groups()
        .iter()
        .map(|g| {
            let names = g
                .members()
                .iter()
                .filter_map(|&m| board.entity(m).ok().map(|e| e.name().to_string()))
                .collect();
            (names, g.priority())
        })
        .collect();

    if json_mode {
        let output = serde_json::json!({
            "valid": true,
            "entities": board.entity_count(),
            "groups": groups
                .iter()
                .map(|(members, priority)| serde_json::json!({
                    "members": members,
                    "priority": priority,
                }))
                .collect::<Vec<_>>(),
            "features": features.names().collect::<Vec<_>>(),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Model OK: {:?}", model_path);
    println!("Entities: {}", board.entity_count());
    println!("Groups:   {}", groups.len());
    for (members, priority) in &groups {
        println!("  [{}] initial priority {:.3}", members.join(", "), priority);
    }

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Print a stored summary file.
pub fn cmd_inspect(json_mode: bool, input: &Path) -> Result<(), AgoraError> {
    let summary = read_summary_file(input)?;
    if json_mode {
        print_json(&summary_json(&summary));
    } else {
        print_summary_text(&summary);
    }
    Ok(())
}

// =============================================================================
// ARCHIVE COMMANDS
// =============================================================================

/// List archived runs.
pub fn cmd_archive_list(archive_path: &Path, json_mode: bool) -> Result<(), AgoraError> {
    let names = RunArchive::open(archive_path)?.list()?;
    if json_mode {
        print_json(&serde_json::json!({ "runs": names }));
        return Ok(());
    }
    if names.is_empty() {
        println!("No archived runs in {:?}", archive_path);
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Print an archived run.
pub fn cmd_archive_show(archive_path: &Path, json_mode: bool, name: &str) -> Result<(), AgoraError> {
    let summary = RunArchive::open(archive_path)?
        .load(name)?
        .ok_or_else(|| AgoraError::IoError(format!("No archived run named '{}'", name)))?;
    if json_mode {
        print_json(&summary_json(&summary));
    } else {
        println!("Run: {}", name);
        println!();
        print_summary_text(&summary);
    }
    Ok(())
}

/// Delete an archived run.
pub fn cmd_archive_remove(archive_path: &Path, name: &str) -> Result<(), AgoraError> {
    if RunArchive::open(archive_path)?.remove(name)? {
        println!("Removed '{}'", name);
        Ok(())
    } else {
        Err(AgoraError::IoError(format!(
            "No archived run named '{}'",
            name
        )))
    }
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Compute BLAKE3 cryptographic hash of a summary file.
pub fn cmd_hash(json_mode: bool, input: &Path) -> Result<(), AgoraError> {
    let summary = read_summary_file(input)?;
    let hash = summary_crypto_hash(&summary)?;
    let checksum = summary.checksum();

    if json_mode {
        let output = serde_json::json!({
            "algorithm": "blake3",
            "hash": hash,
            "checksum": checksum,
            "entities": summary.metrics.entity_count,
            "activations": summary.metrics.activation_count,
        });
        print_json(&output);
    } else {
        println!("BLAKE3:   {}", hash);
        println!("Checksum: {:016x}", checksum);
    }

    Ok(())
}
