use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use xform_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;

/// Configuration for running a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub batch_size: u64,
    /// Microseconds since epoch. Table versions newer than this are ignored.
    pub as_of: i64,
    /// Stop pulling after this many milliseconds. Zero means no timeout.
    pub query_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            batch_size: DEFAULT_BATCH_SIZE as u64,
            as_of: Utc::now().timestamp_micros(),
            query_timeout_ms: 0,
        }
    }
}

impl SessionConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| missing_setting(name))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| missing_setting(name))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| missing_setting(name))?;

        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size as usize
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.query_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

fn missing_setting(name: &str) -> DbError {
    let mut names: Vec<_> = GET_SET_FUNCTIONS.keys().copied().collect();
    names.sort_unstable();
    DbError::usage(format!("Missing setting for '{name}'")).with_field("available", names.join(", "))
}

struct SettingFunctions {
    set: fn(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<BatchSize>(&mut map);
    insert_setting::<AsOf>(&mut map);
    insert_setting::<QueryTimeoutMs>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue;
}

pub const DEFAULT_BATCH_SIZE: usize = 10240;

const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 1 << 20;

pub struct BatchSize;

impl BatchSize {
    pub fn validate_value(val: usize) -> Result<()> {
        if val < MIN_BATCH_SIZE {
            return Err(DbError::usage(format!(
                "Batch size cannot be less than {MIN_BATCH_SIZE}"
            )));
        }

        if val > MAX_BATCH_SIZE {
            return Err(DbError::usage(format!(
                "Batch size cannot be greater than {MAX_BATCH_SIZE}"
            )));
        }

        Ok(())
    }
}

impl SessionSetting for BatchSize {
    const NAME: &'static str = "batch_size";
    const DESCRIPTION: &'static str = "Desired number of rows per pulled batch";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        Self::validate_value(val)?;
        conf.batch_size = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.batch_size.into()
    }
}

pub struct AsOf;

impl SessionSetting for AsOf {
    const NAME: &'static str = "as_of";
    const DESCRIPTION: &'static str = "Point in time to read table versions as of";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        match scalar.try_cast_to(DataType::DateTime)? {
            ScalarValue::DateTime(v) => {
                conf.as_of = v;
                Ok(())
            }
            other => Err(DbError::usage(format!("Expected a date time, got '{other}'"))),
        }
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        ScalarValue::DateTime(conf.as_of)
    }
}

pub struct QueryTimeoutMs;

impl SessionSetting for QueryTimeoutMs {
    const NAME: &'static str = "query_timeout_ms";
    const DESCRIPTION: &'static str = "Stop a query after this many milliseconds, 0 to disable";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.query_timeout_ms = scalar.try_as_usize()? as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.query_timeout_ms.into()
    }
}
