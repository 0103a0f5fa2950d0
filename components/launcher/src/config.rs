// Copyright (c) 2017 Chef Software Inc. and/or applicable contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The boot-config store (C1): a flat, whitespace-separated text file
//! recording which binaries should be re-queued to `Run` at daemon start.
//!
//! Record shape, one per line:
//!   name argc arg1 .. argc term_rerun time_to_stop_ms
//! preceded by a single header line holding the record count. Arguments
//! containing whitespace are not representable in this format; see
//! `SPEC_FULL.md` §4.1/§9.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use sv_protocol::ProcessConfig;

use error::{Error, Result};

pub type BinName = String;

/// Load the boot list, tolerating a missing or empty file. Every loaded
/// entry has `launch_on_boot` forced to `true`, since presence in this file
/// is itself the definition of "launch on boot".
pub fn load(path: &Path) -> Result<Vec<(BinName, ProcessConfig)>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(ref e) if e.kind() == ::std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::ConfigIo {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    let mut lines = BufReader::new(file).lines();
    let header = match lines.next() {
        Some(Ok(line)) => line,
        Some(Err(e)) => {
            return Err(Error::ConfigIo {
                path: path.to_path_buf(),
                source: e,
            })
        }
        None => return Ok(Vec::new()),
    };
    let count: usize = match header.trim().parse() {
        Ok(n) => n,
        Err(_) => {
            return Err(Error::ConfigParse {
                path: path.to_path_buf(),
                line: 1,
            })
        }
    };

    let mut entries = Vec::with_capacity(count);
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(|e| Error::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        let (name, config) = parse_record(&line).ok_or_else(|| Error::ConfigParse {
            path: path.to_path_buf(),
            line: idx + 2,
        })?;
        entries.push((name, config));
    }
    Ok(entries)
}

fn parse_record(line: &str) -> Option<(BinName, ProcessConfig)> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?.to_string();
    let argc: usize = tokens.next()?.parse().ok()?;
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(tokens.next()?.to_string());
    }
    let term_rerun = tokens.next()? != "0";
    let time_to_stop_ms: u64 = tokens.next()?.parse().ok()?;
    let time_to_stop_ms = if time_to_stop_ms == 0 { None } else { Some(time_to_stop_ms) };
    Some((name, ProcessConfig::new(args, true, term_rerun, time_to_stop_ms)))
}

/// Overwrite `path` with `entries`. Written to a sibling temp file and
/// renamed into place, so that a crash mid-write leaves the previous
/// version intact rather than a half-written header/count mismatch.
pub fn save(path: &Path, entries: &[(BinName, ProcessConfig)]) -> Result<()> {
    let tmp_path = tmp_path_for(path);
    {
        let mut file = File::create(&tmp_path).map_err(|e| Error::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        writeln!(file, "{}", entries.len()).map_err(|e| Error::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        for (name, config) in entries {
            let tts = config.time_to_stop_ms.unwrap_or(0);
            write!(file, "{}\t{}", name, config.args.len()).map_err(|e| Error::ConfigIo {
                path: path.to_path_buf(),
                source: e,
            })?;
            for arg in &config.args {
                write!(file, "\t{}", arg).map_err(|e| Error::ConfigIo {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
            writeln!(file, "\t{}\t{}", if config.term_rerun { 1 } else { 0 }, tts).map_err(|e| {
                Error::ConfigIo {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
        }
    }
    fs::rename(&tmp_path, path).map_err(|e| Error::ConfigIo {
        path: path.to_path_buf(),
        source: e,
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn scratch_path(name: &str) -> PathBuf {
        let mut p = env::temp_dir();
        p.push(format!("sv-config-test-{}-{}", name, sv_core::current_pid()));
        p
    }

    #[test]
    fn missing_file_loads_empty() {
        let path = scratch_path("missing");
        let _ = fs::remove_file(&path);
        let entries = load(&path).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn round_trip_preserves_entries() {
        let path = scratch_path("roundtrip");
        let entries = vec![
            (
                "/bin/sleep".to_string(),
                ProcessConfig::new(vec!["10".to_string()], true, true, Some(500)),
            ),
            (
                "/bin/true".to_string(),
                ProcessConfig::new(vec![], true, false, None),
            ),
        ];
        save(&path, &entries).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, entries);
        let _ = fs::remove_file(&path);
    }
}
