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

//! IO functionality for the registrar's roster: a CSV file with one row per student, keyed by the
//! student id. The roster provides names, GPA, citizenship data and email addresses, which are
//! matched against the survey responses.

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// One row of the roster CSV file
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    pub first: String,
    pub last: String,
    /// Unparseable values (e.g. for students without grades yet) are read as +∞
    #[serde(deserialize_with = "lenient_gpa")]
    pub gpa: f32,
    pub citizenship: String,
    pub visa: String,
    pub email: String,
}

fn lenient_gpa<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().parse().unwrap_or(f32::INFINITY))
}

/// Row of the token database used to activate the survey accounts
#[derive(Serialize)]
struct TokenRow<'a> {
    firstname: &'a str,
    lastname: &'a str,
    email: &'a str,
    token: &'a str,
}

/// The parsed roster
#[derive(Clone, Debug, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    by_id: HashMap<String, usize>,
}

impl Roster {
    /// Read the roster from a CSV file with the header row
    /// `student_id,first,last,gpa,citizenship,visa,email`
    pub fn read<R: std::io::Read>(reader: R) -> Result<Roster, String> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut roster = Roster::default();

        for (i, row) in csv_reader.deserialize::<RosterEntry>().enumerate() {
            let entry = row.map_err(|e| format!("Invalid roster row {}: {}", i + 1, e))?;
            if let Some(previous) = roster.by_id.insert(entry.student_id.clone(), roster.entries.len())
            {
                warn!(
                    "Student id {} is listed twice in the roster. Using row {} instead of row {}.",
                    entry.student_id,
                    i + 1,
                    previous + 1
                );
            }
            roster.entries.push(entry);
        }

        Ok(roster)
    }

    pub fn lookup(&self, student_id: &str) -> Option<&RosterEntry> {
        self.by_id.get(student_id).map(|i| &self.entries[*i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the token database (`firstname,lastname,email,token`, the student id serving as
    /// token) for the survey platform
    pub fn write_tokens<W: std::io::Write>(&self, writer: W) -> Result<(), String> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for entry in self.entries.iter() {
            csv_writer
                .serialize(TokenRow {
                    firstname: &entry.first,
                    lastname: &entry.last,
                    email: &entry.email,
                    token: &entry.student_id,
                })
                .map_err(|e| e.to_string())?;
        }
        csv_writer.flush().map_err(|e| e.to_string())?;
        Ok(())
    }
}
