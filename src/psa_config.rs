// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use bitflags::bitflags;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ByteSpan;

bitflags! {
    /// Which channels of a bone's track to leave out when importing.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RemoveTracks: u8 {
        const LOCATION = 1 << 0;
        const ROTATION = 1 << 1;
    }
}

impl RemoveTracks {
    fn from_value(value: &str) -> Self {
        match value {
            "all" => RemoveTracks::LOCATION | RemoveTracks::ROTATION,
            "trans" => RemoveTracks::LOCATION,
            "rot" => RemoveTracks::ROTATION,
            _ => RemoveTracks::empty(),
        }
    }
}

/// The contents of a UEViewer `.config` file that accompanies a PSA.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PsaConfig {
    /// A map of sequence name to the removal flags of each bone index.
    pub sequence_bone_flags: HashMap<String, HashMap<usize, RemoveTracks>>,
}

/// Represents a config file, which is made up of sections of keys.
struct IniFile {
    /// A mapping of lowercased section name to its keys, in file order. Keys are lowercased too.
    sections: HashMap<String, Vec<(String, String)>>,
}

impl IniFile {
    /// Parses the UEViewer dialect, which allows bare keys without a `=`.
    fn from_existing(buffer: ByteSpan) -> IniFile {
        let mut ini = IniFile {
            sections: HashMap::new(),
        };

        let reader = BufReader::new(Cursor::new(buffer));
        let mut current_section: Option<String> = None;

        for line in reader.split(b'\n') {
            let Ok(line) = line else {
                break;
            };
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.split_once(']')) {
                current_section = Some(name.0.trim().to_lowercase());
                continue;
            }

            let Some(section) = &current_section else {
                continue;
            };

            // Bare keys are treated as if they had an empty value
            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            ini.sections
                .entry(section.clone())
                .or_default()
                .push((key.trim().to_lowercase(), value.trim().to_string()));
        }

        ini
    }
}

impl PsaConfig {
    /// Parses an existing config file. Sequence names are matched case-insensitively against `sequence_names`,
    /// and entries for sequences that aren't in the PSA are dropped.
    pub fn from_existing(buffer: ByteSpan, sequence_names: &[String]) -> PsaConfig {
        let ini = IniFile::from_existing(buffer);
        let mut config = PsaConfig::default();

        let Some(remove_tracks) = ini.sections.get("removetracks") else {
            return config;
        };

        let Ok(key_regex) = Regex::new(r"^(.+)\.(\d+)$") else {
            return config;
        };

        for (key, value) in remove_tracks {
            let Some(captures) = key_regex.captures(key) else {
                continue;
            };

            let sequence_name = &captures[1];
            let Some(sequence_name) = sequence_names
                .iter()
                .find(|name| name.to_lowercase() == sequence_name.to_lowercase())
            else {
                debug!("Ignoring tracks for {sequence_name}, which is not in the PSA");
                continue;
            };

            let Ok(bone_index) = captures[2].parse::<usize>() else {
                continue;
            };

            config
                .sequence_bone_flags
                .entry(sequence_name.clone())
                .or_default()
                .insert(bone_index, RemoveTracks::from_value(value));
        }

        config
    }

    /// Reads the config file at `path`.
    pub fn from_file(path: impl AsRef<Path>, sequence_names: &[String]) -> Result<PsaConfig> {
        let path = path.as_ref();
        let buffer = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::from_existing(&buffer, sequence_names))
    }

    /// The flags for one bone of one sequence, empty if the config doesn't mention it.
    pub fn bone_flags(&self, sequence_name: &str, bone_index: usize) -> RemoveTracks {
        self.sequence_bone_flags
            .get(sequence_name)
            .and_then(|bones| bones.get(&bone_index))
            .copied()
            .unwrap_or_default()
    }
}
