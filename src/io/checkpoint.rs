// Copyright 2020 by Michael Thies <mail@mhthies.de>
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Persistence of good allocations found by the search driver.
//!
//! Each checkpoint is a JSON file, named `<score>.<unix seconds>.<microseconds>.json`, holding the
//! score, a timestamp and the teams as project name → list of student ids. Names and ids are
//! resolved against the current survey when a checkpoint is loaded, so checkpoints survive
//! reordering of the survey data.

use crate::alloc::Allocation;
use crate::{Cost, Survey};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

const FORMAT: &str = "X-teamalloc-checkpoint";
const VERSION: &str = "1.0";

/// Name of the checkpoint file for an allocation with the given score, saved at the given time
pub fn file_name(score: Cost, timestamp: DateTime<Utc>) -> String {
    format!(
        "{:03}.{}.{:06}.json",
        score,
        timestamp.timestamp(),
        timestamp.timestamp_subsec_micros()
    )
}

/// Write an allocation with its score as checkpoint JSON data to a Writer
pub fn write<W: std::io::Write>(
    writer: W,
    survey: &Survey,
    alloc: &Allocation,
    score: Cost,
    timestamp: DateTime<Utc>,
) -> Result<(), String> {
    let teams = alloc
        .teams()
        .map(|(p, team)| {
            let mut ids: Vec<&str> = team
                .iter()
                .map(|s| survey.students[*s].id.as_str())
                .collect();
            ids.sort();
            (survey.projects[p].name.clone(), json!(ids))
        })
        .collect::<serde_json::Map<String, serde_json::Value>>();

    let data = json!({
        "format": FORMAT,
        "version": VERSION,
        "score": score,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        "teams": teams,
    });
    serde_json::to_writer_pretty(writer, &data).map_err(|e| format!("{}", e))?;

    Ok(())
}

/// Check the format tag and the major version of checkpoint JSON data
fn check_format(data: &serde_json::Value) -> Result<(), String> {
    let format = data
        .get("format")
        .and_then(|v| v.as_str())
        .ok_or("No 'format' field found in data. Is this a checkpoint file?")?;
    if format != FORMAT {
        return Err(format!("Unexpected checkpoint format '{}'", format));
    }
    let version = data
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or("No 'version' field found in checkpoint")?;
    if version.split('.').next() != VERSION.split('.').next() {
        return Err(format!("Unsupported checkpoint version {}", version));
    }
    Ok(())
}

/// Extract the teams of checkpoint JSON data as project name → set of student ids
fn parse_teams(
    mut data: serde_json::Value,
) -> Result<BTreeMap<String, BTreeSet<String>>, String> {
    check_format(&data)?;
    serde_json::from_value(data["teams"].take())
        .map_err(|e| format!("Invalid teams in checkpoint: {}", e))
}

/// Read a checkpoint and rebuild the allocation for the given survey. The realized conflicts of
/// the allocation are noted.
///
/// Returns the allocation with the score stored in the checkpoint.
///
/// # Errors
/// Fails on malformed data, unknown project names or student ids, and if a student of the survey
/// is missing from the checkpoint or listed twice.
pub fn read<R: std::io::Read>(reader: R, survey: &Survey) -> Result<(Allocation, Cost), String> {
    let data: serde_json::Value = serde_json::from_reader(reader).map_err(|e| e.to_string())?;
    let score = data
        .get("score")
        .and_then(|v| v.as_i64())
        .ok_or("No integer 'score' found in checkpoint")?;
    let teams = parse_teams(data)?;

    let mut alloc = Allocation::new(survey);
    for (name, ids) in teams.iter() {
        let project = survey
            .find_project(name)
            .ok_or(format!("Unknown project '{}' in checkpoint", name))?;
        for id in ids.iter() {
            let student = survey
                .find_student_by_id(id)
                .ok_or(format!("Unknown student id '{}' in checkpoint", id))?;
            if let Some(other) = alloc.ison(student) {
                return Err(format!(
                    "Student {} is listed on {} and {} in checkpoint",
                    survey.students[student], survey.projects[other].name, name
                ));
            }
            alloc.add(student, project);
        }
    }
    if let Some(missing) = (0..survey.students.len()).find(|s| alloc.ison(*s).is_none()) {
        return Err(format!(
            "Student {} is missing from checkpoint",
            survey.students[missing]
        ));
    }

    alloc.note_conflicts(survey);
    Ok((alloc, score))
}

fn open(path: &Path) -> Result<std::fs::File, String> {
    std::fs::File::open(path).map_err(|e| format!("Could not open {}: {}", path.display(), e))
}

/// Load the checkpoint file at `path`, see `read()`
pub fn load(path: &Path, survey: &Survey) -> Result<(Allocation, Cost), String> {
    read(std::io::BufReader::new(open(path)?), survey)
        .map_err(|e| format!("{}: {}", path.display(), e))
}

/// Save a checkpoint file into `dir`. The file is written under a temporary name first and
/// renamed when complete.
///
/// Returns the path of the new file.
pub fn save(dir: &Path, survey: &Survey, alloc: &Allocation, score: Cost) -> Result<PathBuf, String> {
    save_at(dir, survey, alloc, score, Utc::now())
}

fn save_at(
    dir: &Path,
    survey: &Survey,
    alloc: &Allocation,
    score: Cost,
    timestamp: DateTime<Utc>,
) -> Result<PathBuf, String> {
    let name = file_name(score, timestamp);
    let path = dir.join(&name);
    let tmp_path = dir.join(format!(".{}.tmp", name));

    let file = std::fs::File::create(&tmp_path)
        .map_err(|e| format!("Could not create {}: {}", tmp_path.display(), e))?;
    let mut writer = std::io::BufWriter::new(file);
    let written = write(&mut writer, survey, alloc, score, timestamp).and_then(|_| {
        writer
            .flush()
            .map_err(|e| format!("Could not write {}: {}", tmp_path.display(), e))
    });
    drop(writer);
    let result = written.and_then(|_| {
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| format!("Could not rename {}: {}", tmp_path.display(), e))
    });
    if let Err(e) = result {
        if let Err(remove_error) = std::fs::remove_file(&tmp_path) {
            warn!("Could not remove {}: {}", tmp_path.display(), remove_error);
        }
        return Err(e);
    }

    info!("Saved allocation with score {} to {}", score, path.display());
    Ok(path)
}

/// Score encoded in the name of a checkpoint file
fn score_of(path: &Path) -> Option<Cost> {
    path.file_name()?.to_str()?.split('.').next()?.parse().ok()
}

/// All checkpoint files in `dir`, best score first. Files of equal score are ordered by name,
/// i.e. by time of creation. Files without a score in their name come last.
pub fn list(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("Could not read {}: {}", dir.display(), e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        if !hidden && path.is_file() && path.extension().map_or(false, |e| e == "json") {
            paths.push(path);
        }
    }
    paths.sort_by_cached_key(|p| (score_of(p).map_or((1, 0), |s| (0, s)), p.clone()));
    Ok(paths)
}

/// Delete all checkpoint files in `dir` whose teams equal those of a file listed earlier (see
/// `list()`). Files that cannot be parsed are skipped.
///
/// Returns the number of deleted files.
pub fn dedupe(dir: &Path) -> Result<usize, String> {
    let mut seen = HashSet::new();
    let mut removed = 0;
    for path in list(dir)? {
        let teams = open(&path).and_then(|f| {
            let data = serde_json::from_reader(std::io::BufReader::new(f))
                .map_err(|e| e.to_string())?;
            parse_teams(data)
        });
        let teams = match teams {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !seen.insert(teams) {
            std::fs::remove_file(&path)
                .map_err(|e| format!("Could not remove {}: {}", path.display(), e))?;
            info!("Removed duplicate {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

/// Saves the checkpoints of one search run, skipping allocations that have been saved before in
/// the same run
pub struct Checkpointer<'a> {
    dir: PathBuf,
    survey: &'a Survey,
    seen: HashSet<Vec<Option<usize>>>,
}

impl<'a> Checkpointer<'a> {
    pub fn new(dir: PathBuf, survey: &'a Survey) -> Self {
        Checkpointer {
            dir,
            survey,
            seen: HashSet::new(),
        }
    }

    /// Save the allocation, unless it is a duplicate. Returns the path of the new file, if any.
    pub fn save(&mut self, alloc: &Allocation, score: Cost) -> Result<Option<PathBuf>, String> {
        if !self.seen.insert(alloc.assignment()) {
            debug!("Allocation with score {} has been saved before", score);
            return Ok(None);
        }
        save(&self.dir, self.survey, alloc, score).map(Some)
    }
}
