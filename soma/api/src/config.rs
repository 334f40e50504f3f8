use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use soma_common::array::ResultOrder;

use crate::error::Error;
use crate::Result as SomaResult;

/// Sort sparse cells into row-major coordinate order before writing them.
pub const SORT_COORDS: &str = "soma.write.sort_coords";
/// Merge all fragments of a sparse array into one after every write.
pub const CONSOLIDATE_AND_VACUUM: &str = "soma.write.consolidate_and_vacuum";
/// Result order used by reads which ask for `ResultOrder::Auto`.
pub const RESULT_ORDER: &str = "soma.read.result_order";
/// Largest number of cells in one batch yielded by a batched read.
pub const READ_BATCH_SIZE: &str = "soma.read.batch_size";

const DEFAULT_READ_BATCH_SIZE: usize = 65536;

const DEFAULTS: [(&str, &str); 4] = [
    (SORT_COORDS, "true"),
    (CONSOLIDATE_AND_VACUUM, "false"),
    (RESULT_ORDER, "auto"),
    (READ_BATCH_SIZE, "65536"),
];

/// String key/value settings for a [Context](crate::context::Context).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    entries: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            entries: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn set<S>(&mut self, key: &str, val: S)
    where
        S: AsRef<str>,
    {
        self.entries.insert(key.to_owned(), val.as_ref().to_owned());
    }

    pub fn with<S>(self, key: &str, val: S) -> Self
    where
        S: AsRef<str>,
    {
        let mut s = self;
        s.set(key, val);
        s
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parses the value of `key`, returning `None` if it is unset.
    pub fn get_parsed<T>(&self, key: &str) -> SomaResult<Option<T>>
    where
        T: FromStr,
    {
        self.get(key)
            .map(|v| {
                v.parse::<T>().map_err(|_| Error::InvalidConfig {
                    key: key.to_owned(),
                    value: v.to_owned(),
                })
            })
            .transpose()
    }

    pub fn set_common_option(&mut self, opt: &CommonOption) {
        opt.apply(self)
    }

    pub fn with_common_option(self, opt: &CommonOption) -> Self {
        let mut s = self;
        s.set_common_option(opt);
        s
    }

    /// Removes `key`, restoring its default if it has one.
    pub fn unset(&mut self, key: &str) {
        match DEFAULTS.iter().find(|(k, _)| *k == key) {
            Some((_, default)) => self.set(key, default),
            None => {
                self.entries.remove(key);
            }
        }
    }

    /// Reads settings from a file of `key value` lines. Blank lines and
    /// lines starting with `#` are skipped.
    pub fn load<P>(&mut self, path: P) -> SomaResult<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(Error::io(path))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k, v.trim()))
                .unwrap_or((line, ""));
            self.set(key, value);
        }
        Ok(())
    }

    pub fn save<P>(&self, path: P) -> SomaResult<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k} {v}\n"))
            .collect::<String>();
        std::fs::write(path, text).map_err(Error::io(path))
    }

    pub fn sort_coords(&self) -> SomaResult<bool> {
        Ok(self.get_parsed(SORT_COORDS)?.unwrap_or(true))
    }

    pub fn consolidate_and_vacuum(&self) -> SomaResult<bool> {
        Ok(self.get_parsed(CONSOLIDATE_AND_VACUUM)?.unwrap_or(false))
    }

    pub fn result_order(&self) -> SomaResult<ResultOrder> {
        Ok(self.get_parsed(RESULT_ORDER)?.unwrap_or_default())
    }

    /// The batch size for batched reads. Zero is not a valid size.
    pub fn read_batch_size(&self) -> SomaResult<usize> {
        match self.get_parsed::<usize>(READ_BATCH_SIZE)? {
            Some(0) => Err(Error::InvalidConfig {
                key: READ_BATCH_SIZE.to_owned(),
                value: "0".to_owned(),
            }),
            Some(n) => Ok(n),
            None => Ok(DEFAULT_READ_BATCH_SIZE),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl<'cfg> IntoIterator for &'cfg Config {
    type Item = (&'cfg str, &'cfg str);
    type IntoIter = Box<dyn Iterator<Item = (&'cfg str, &'cfg str)> + 'cfg>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Convenience for setting the options which the arrays themselves read.
#[derive(Clone, Debug)]
pub enum CommonOption {
    /// Sort sparse cells before they are written.
    SortCoords(bool),

    /// Consolidate sparse fragments after every write.
    ConsolidateAndVacuum(bool),

    /// Order of cells for reads which do not choose one.
    ResultOrder(ResultOrder),

    /// Largest number of cells per batch of a batched read.
    ReadBatchSize(usize),
}

impl CommonOption {
    fn apply(&self, config: &mut Config) {
        match self {
            Self::SortCoords(sort) => {
                config.set(SORT_COORDS, if *sort { "true" } else { "false" })
            }
            Self::ConsolidateAndVacuum(consolidate) => config.set(
                CONSOLIDATE_AND_VACUUM,
                if *consolidate { "true" } else { "false" },
            ),
            Self::ResultOrder(order) => {
                config.set(RESULT_ORDER, order.to_string())
            }
            Self::ReadBatchSize(size) => {
                config.set(READ_BATCH_SIZE, size.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_set() {
        let mut cfg = Config::new();
        assert!(cfg.get("rs.soma.test_key").is_none());

        cfg.set("rs.soma.test_key", "foobar");
        assert_eq!(Some("foobar"), cfg.get("rs.soma.test_key"));

        cfg.unset("rs.soma.test_key");
        assert!(cfg.get("rs.soma.test_key").is_none());
    }

    #[test]
    fn config_defaults() {
        let cfg = Config::new();
        assert!(cfg.sort_coords().unwrap());
        assert!(!cfg.consolidate_and_vacuum().unwrap());
        assert_eq!(ResultOrder::Auto, cfg.result_order().unwrap());
        assert_eq!(65536, cfg.read_batch_size().unwrap());

        let mut cfg = cfg.with(SORT_COORDS, "false");
        assert!(!cfg.sort_coords().unwrap());
        cfg.unset(SORT_COORDS);
        assert!(cfg.sort_coords().unwrap());
    }

    #[test]
    fn config_invalid_value() {
        let cfg = Config::new().with(SORT_COORDS, "sometimes");
        assert!(matches!(
            cfg.sort_coords(),
            Err(Error::InvalidConfig { .. })
        ));

        for size in ["0", "-1", "many"] {
            let cfg = Config::new().with(READ_BATCH_SIZE, size);
            assert!(matches!(
                cfg.read_batch_size(),
                Err(Error::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn config_save_load() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("soma.config");

        let cfg1 = Config::new().with("rs.soma.test_key", "foo bar");
        cfg1.save(&path)?;

        let mut cfg2 = Config::new();
        cfg2.load(&path)?;
        assert_eq!(Some("foo bar"), cfg2.get("rs.soma.test_key"));
        assert_eq!(cfg1, cfg2);
        Ok(())
    }

    #[test]
    fn config_iter() {
        let cfg = Config::new();
        let keys = cfg.into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(DEFAULTS.len(), keys.len());
        assert!(keys.contains(&RESULT_ORDER));
    }

    #[test]
    fn config_with_common_options() {
        let cfg = Config::new()
            .with_common_option(&CommonOption::SortCoords(false))
            .with_common_option(&CommonOption::ConsolidateAndVacuum(true))
            .with_common_option(&CommonOption::ResultOrder(
                ResultOrder::ColumnMajor,
            ))
            .with_common_option(&CommonOption::ReadBatchSize(100));

        assert_eq!(Some("false"), cfg.get(SORT_COORDS));
        assert_eq!(Some("true"), cfg.get(CONSOLIDATE_AND_VACUUM));
        assert_eq!(Some("column-major"), cfg.get(RESULT_ORDER));
        assert_eq!(ResultOrder::ColumnMajor, cfg.result_order().unwrap());
        assert_eq!(100, cfg.read_batch_size().unwrap());
    }
}
