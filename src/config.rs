//! Run configuration: project list, staffing bounds, locking/barring rules and the penalty
//! weights of the cost model.
//!
//! The configuration is read from a JSON file. Every field has a default, so an empty object `{}`
//! is a valid (if not very useful) configuration.

use super::{Cost, Rank};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Names of the projects students rank in the survey
    pub projects: Vec<String>,
    /// Projects that are not part of the survey. They are appended to the project list and every
    /// student ranks them with the minimum rank.
    pub unlisted_projects: Vec<String>,
    pub min_staff: usize,
    pub max_staff: usize,
    /// Per-project exceptions from `min_staff`
    pub min_staff_overrides: HashMap<String, usize>,
    /// Per-project exceptions from `max_staff`
    pub max_staff_overrides: HashMap<String, usize>,
    /// Projects that require citizenship or permanent residency
    pub restricted_projects: Vec<String>,
    /// Citizenship values qualifying a student for restricted projects
    pub eligible_citizenships: Vec<String>,
    /// Visa values qualifying a student for restricted projects
    pub eligible_visas: Vec<String>,
    /// (student name, project name) pairs: the student is forced onto the project
    pub locked_students: Vec<(String, String)>,
    /// (student name, project name) pairs: the student is kept off the project
    pub barred_students: Vec<(String, String)>,
    /// Known misspelled avoided-peer names mapped to the canonical student name
    pub name_fixes: HashMap<String, String>,
    /// Raise every student's best rank to the maximum rank, if it is lower
    pub promote_top_choice: bool,
    /// Minimum similarity for fuzzy name matching
    pub fuzzy_cutoff: f64,
    pub penalties: Penalties,
    /// Allocations scoring below this value are checkpointed
    pub save_threshold: Cost,
    /// The optimizer refuses to run with fewer students
    pub min_students: usize,
    /// Only swaps and moves cheaper than this are listed in the swap report
    pub suggestion_cutoff: Cost,
    /// Number of constructions per restart; the cheapest one is improved
    pub seed_candidates: usize,
    pub construction: Construction,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            projects: Vec::new(),
            unlisted_projects: Vec::new(),
            min_staff: 5,
            max_staff: 6,
            min_staff_overrides: HashMap::new(),
            max_staff_overrides: HashMap::new(),
            restricted_projects: Vec::new(),
            eligible_citizenships: vec!["UNITED STATES".to_owned()],
            eligible_visas: vec!["Permanent Resident".to_owned()],
            locked_students: Vec::new(),
            barred_students: Vec::new(),
            name_fixes: HashMap::new(),
            promote_top_choice: false,
            fuzzy_cutoff: 0.6,
            penalties: Penalties::default(),
            save_threshold: 29,
            min_students: 10,
            suggestion_cutoff: 100,
            seed_candidates: 1,
            construction: Construction::StudentGreedy,
        }
    }
}

/// Constructive heuristic used by the search driver to seed each restart
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Construction {
    StudentGreedy,
    ProjectGreedy,
    /// Alternate between both heuristics from restart to restart
    Alternate,
}

/// Weights of the cost model
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Penalties {
    pub rank: RankPenalties,
    /// Per directed realized conflict
    pub conflict: Cost,
    /// Per overstaffed team
    pub over_staff: Cost,
    /// Per understaffed team
    pub under_staff: Cost,
    /// Per team exceeding its low-GPA cap
    pub low_gpa: Cost,
    /// Per ineligible member of a restricted project
    pub non_citizen: Cost,
    /// GPAs below this value count as low
    pub low_gpa_threshold: f32,
    pub gpa_caps: GpaCaps,
}

impl Default for Penalties {
    fn default() -> Self {
        Penalties {
            rank: RankPenalties::default(),
            conflict: 100,
            over_staff: 100000,
            under_staff: 100000,
            low_gpa: 100,
            non_citizen: 1000,
            low_gpa_threshold: 3.0,
            gpa_caps: GpaCaps::default(),
        }
    }
}

/// Lookup table rank → placement penalty, covering exactly the valid ranks
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "BTreeMap<u8, Cost>", into = "BTreeMap<u8, Cost>")]
pub struct RankPenalties([Cost; Rank::MAX.0 as usize]);

impl RankPenalties {
    pub fn penalty(&self, rank: Rank) -> Cost {
        self.0[(rank.get() - Rank::MIN.get()) as usize]
    }
}

impl Default for RankPenalties {
    fn default() -> Self {
        RankPenalties([10000, 1000, 5, 1, 0])
    }
}

impl TryFrom<BTreeMap<u8, Cost>> for RankPenalties {
    type Error = String;

    fn try_from(map: BTreeMap<u8, Cost>) -> Result<Self, Self::Error> {
        let mut table = [0; Rank::MAX.0 as usize];
        for (key, value) in map.iter() {
            let rank = Rank::try_from(*key)?;
            table[(rank.get() - Rank::MIN.get()) as usize] = *value;
        }
        for rank in Rank::all() {
            if !map.contains_key(&rank.get()) {
                return Err(format!("No penalty given for preference rank {}", rank));
            }
        }
        if table.windows(2).any(|w| w[0] <= w[1]) {
            return Err(
                "Rank penalties must strictly decrease with increasing preference rank".to_owned(),
            );
        }
        Ok(RankPenalties(table))
    }
}

impl From<RankPenalties> for BTreeMap<u8, Cost> {
    fn from(table: RankPenalties) -> Self {
        Rank::all().map(|r| (r.get(), table.penalty(r))).collect()
    }
}

/// Lookup table team size → maximum number of low-GPA members.
///
/// Team sizes without an entry are not capped. `Config::validate()` ensures that every size
/// within a project's staffing bounds has an entry.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GpaCaps(BTreeMap<usize, usize>);

impl GpaCaps {
    pub fn cap(&self, team_size: usize) -> Option<usize> {
        self.0.get(&team_size).copied()
    }
}

impl Default for GpaCaps {
    fn default() -> Self {
        GpaCaps(
            vec![(4, 2), (5, 2), (6, 3), (7, 3), (8, 3)]
                .into_iter()
                .collect(),
        )
    }
}

impl Config {
    /// Read the configuration from a JSON file and validate it
    pub fn read<R: std::io::Read>(reader: R) -> Result<Config, String> {
        let config: Config = serde_json::from_reader(reader).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Staffing bounds (min, max) of the named project, taking the per-project overrides into
    /// account
    pub fn staffing(&self, project_name: &str) -> (usize, usize) {
        (
            *self
                .min_staff_overrides
                .get(project_name)
                .unwrap_or(&self.min_staff),
            *self
                .max_staff_overrides
                .get(project_name)
                .unwrap_or(&self.max_staff),
        )
    }

    /// All project names: the surveyed projects followed by the unlisted ones
    pub fn all_project_names(&self) -> impl Iterator<Item = &String> {
        self.projects.iter().chain(self.unlisted_projects.iter())
    }

    /// Check the configuration for consistency. Staffing overrides of unknown projects are
    /// reported as warnings; everything else listed below is an error:
    /// * min_staff > max_staff for any project
    /// * duplicate project names
    /// * a GPA cap table not covering a team size within any project's staffing bounds
    /// * a fuzzy cutoff outside [0, 1]
    /// * zero seed candidates
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for name in self.all_project_names() {
            if !seen.insert(name) {
                return Err(format!("Project '{}' is configured twice", name));
            }
            let (min, max) = self.staffing(name);
            if min > max {
                return Err(format!(
                    "Min staff ({}) > max staff ({}) for project '{}'",
                    min, max, name
                ));
            }
            for size in min..=max {
                if self.penalties.gpa_caps.cap(size).is_none() {
                    return Err(format!(
                        "No low-GPA cap given for team size {} (needed by project '{}')",
                        size, name
                    ));
                }
            }
        }
        for name in self
            .min_staff_overrides
            .keys()
            .chain(self.max_staff_overrides.keys())
        {
            if !seen.contains(name) {
                log::warn!("Staffing override for unknown project '{}'", name);
            }
        }
        if !(0.0..=1.0).contains(&self.fuzzy_cutoff) {
            return Err(format!(
                "Fuzzy cutoff {} is not within [0,1]",
                self.fuzzy_cutoff
            ));
        }
        if self.seed_candidates == 0 {
            return Err("seed_candidates must be at least 1".to_owned());
        }
        Ok(())
    }
}
