use std::path::PathBuf;
use std::time::SystemTime;

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;

/// Centralized manager for dump path generation and naming conventions.
///
/// A dump record is a file named `<utc_timestamp>-<seq>`, where the
/// timestamp encodes the record's `update_time` at microsecond precision
/// and `seq` disambiguates records sharing a timestamp. In-progress writes
/// use a `.tmp`-suffixed sibling that is renamed into place on finish.
#[derive(Debug, Clone)]
pub(crate) struct DumpPathManager {
    /// Base directory where this cache's dump records are stored
    pub(crate) base_dir: PathBuf,
}

const DUMP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6f";
const TMP_SUFFIX: &str = ".tmp";

impl DumpPathManager {
    pub(crate) fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// File name of the finalized record for (`update_time`, `seq`)
    pub(crate) fn dump_file_name(
        update_time: SystemTime,
        seq: u32,
    ) -> String {
        let utc: DateTime<Utc> = update_time.into();
        format!("{}-{}", utc.format(DUMP_TIME_FORMAT), seq)
    }

    pub(crate) fn dump_path(
        &self,
        update_time: SystemTime,
        seq: u32,
    ) -> PathBuf {
        self.base_dir.join(Self::dump_file_name(update_time, seq))
    }

    /// Working path for an in-progress write of the given final path
    pub(crate) fn tmp_path(final_path: &std::path::Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_owned();
        name.push(TMP_SUFFIX);
        PathBuf::from(name)
    }

    pub(crate) fn is_tmp_file_name(name: &str) -> bool {
        name.ends_with(TMP_SUFFIX)
    }

    /// Extracts (`update_time`, `seq`) from a finalized record name.
    /// Returns `None` for foreign or temporary files.
    pub(crate) fn parse_dump_file_name(name: &str) -> Option<(SystemTime, u32)> {
        if Self::is_tmp_file_name(name) {
            return None;
        }

        let (timestamp, seq) = name.rsplit_once('-')?;
        let seq: u32 = seq.parse().ok()?;
        let naive = NaiveDateTime::parse_from_str(timestamp, DUMP_TIME_FORMAT).ok()?;
        Some((SystemTime::from(naive.and_utc()), seq))
    }
}
