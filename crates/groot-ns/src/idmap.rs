// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Sub-id range tables.
//!
//! The first range always maps namespace id 0 onto the caller's own host
//! id; the rest come from the system sub-id file, one range per allocation
//! granted to the caller's login name, densely packed from namespace id 1.

use std::fs;
use std::path::Path;

use groot_proto::IdRange;
use tracing::warn;

/// Build one table from a sub-id file (`<name>:<start>:<count>` per line).
/// Lines for other users are ignored; malformed lines warn and are
/// skipped; a missing file just yields the identity mapping.
pub fn build_table(username: Option<&str>, path: &Path, base_id: u32) -> Vec<IdRange> {
    let mut ranges = vec![IdRange {
        ns_start: 0,
        host_start: base_id,
        count: 1,
    }];
    let mut next_id: u32 = 1;

    if let Some(username) = username {
        if let Ok(content) = fs::read_to_string(path) {
            for line in content.lines() {
                let Some(rest) = line.strip_prefix(username) else {
                    continue;
                };
                let Some(rest) = rest.strip_prefix(':') else {
                    continue;
                };
                let mut fields = rest.splitn(2, ':');
                let (Some(start), Some(count)) = (fields.next(), fields.next()) else {
                    warn!(target: "groot::ns", "invalid format of {}", path.display());
                    continue;
                };
                let (Ok(start), Ok(count)) = (start.parse::<u32>(), count.parse::<u32>()) else {
                    warn!(target: "groot::ns", "invalid format of {}", path.display());
                    continue;
                };
                if count == 0 {
                    warn!(target: "groot::ns", "empty sub-id range in {}", path.display());
                    continue;
                }
                ranges.push(IdRange {
                    ns_start: next_id,
                    host_start: start,
                    count,
                });
                next_id += count;
            }
        }
    }

    if next_id == 1 {
        warn!(
            target: "groot::ns",
            "no sub-ids for user {} in {}, limited user/group support",
            username.unwrap_or("?"),
            path.display()
        );
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_subids(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn identity_mapping_always_comes_first() {
        let file = write_subids("");
        let table = build_table(Some("alice"), file.path(), 1000);
        assert_eq!(
            table,
            vec![IdRange {
                ns_start: 0,
                host_start: 1000,
                count: 1
            }]
        );
    }

    #[test]
    fn allocations_pack_densely_from_one() {
        let file = write_subids("alice:100000:65536\nbob:300000:65536\nalice:200000:1000\n");
        let table = build_table(Some("alice"), file.path(), 1000);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table[1],
            IdRange {
                ns_start: 1,
                host_start: 100000,
                count: 65536
            }
        );
        assert_eq!(
            table[2],
            IdRange {
                ns_start: 65537,
                host_start: 200000,
                count: 1000
            }
        );
        assert_eq!(groot_proto::max_ns_id(&table), 66536);
    }

    #[test]
    fn name_matching_is_exact() {
        // "alice" must not pick up "alicea"'s allocation.
        let file = write_subids("alicea:100000:65536\n");
        let table = build_table(Some("alice"), file.path(), 1000);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let file = write_subids("alice:nonsense:10\nalice:100000\nalice:100000:10:extra\nalice:200000:16\n");
        let table = build_table(Some("alice"), file.path(), 1000);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table[1],
            IdRange {
                ns_start: 1,
                host_start: 200000,
                count: 16
            }
        );
    }

    #[test]
    fn missing_file_or_user_degrades_to_identity() {
        let table = build_table(Some("alice"), Path::new("/nonexistent/subuid"), 1000);
        assert_eq!(table.len(), 1);
        let file = write_subids("alice:100000:65536\n");
        let table = build_table(None, file.path(), 1000);
        assert_eq!(table.len(), 1);
    }
}
