use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    convert::{TryFrom, TryInto},
    path::{Path, PathBuf},
};

use anyhow::Context;

/// Flat key/value document with typed getters. Keys read through a getter are
/// remembered so leftovers can be reported as likely typos.
pub struct InputParams {
    params: HashMap<String, InputParamsValue>,
    name: Cow<'static, str>,
    visited_names: HashSet<String>,
    base_path: PathBuf,
}

pub enum InputParamsValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
    Array(Vec<InputParamsValue>),
}

impl InputParamsValue {
    fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    // integers are accepted wherever a float is expected
    fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f32),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

macro_rules! params_get {
    ( $( ( $name:ident, $type:ty, $conv:ident, $hint:expr ) ),+ $(,)? ) => {
        $(
            paste::paste! {
                pub fn [<get_ $name>](&mut self, key: &str) -> anyhow::Result<$type> {
                    if let Some(value) = self.params.get(key) {
                        if let Some(value) = value.$conv() {
                            self.visited_names.insert(key.to_owned());
                            return Ok(value);
                        }
                        anyhow::bail!(format!("{} - '{}' should be {}", self.name, key, $hint));
                    }
                    anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
                }

                /// Falls back when the key is absent. A present key of the wrong type is an error.
                pub fn [<get_ $name _or>](&mut self, key: &str, fallback: $type) -> anyhow::Result<$type> {
                    if self.contains_key(key) {
                        self.[<get_ $name>](key)
                    } else {
                        Ok(fallback)
                    }
                }
            }
        )+
    };
}

macro_rules! params_get_vec {
    ( $( ( $name:ident, $type:ty, $len:expr, $conv:ident, $hint:expr ) ),+ $(,)? ) => {
        $(
            paste::paste! {
                pub fn [<get_ $name>](&mut self, key: &str) -> anyhow::Result<[$type; $len]> {
                    if let Some(value) = self.params.get(key) {
                        let error_info = format!(
                            "{} - '{}' should be array with {} {}s",
                            self.name,
                            key,
                            $len,
                            $hint,
                        );
                        if let InputParamsValue::Array(arr) = value {
                            if arr.len() == $len {
                                let mut result: [$type; $len] = Default::default();
                                for (dst, ele) in result.iter_mut().zip(arr) {
                                    *dst = ele.$conv().context(error_info.clone())?;
                                }
                                self.visited_names.insert(key.to_owned());
                                return Ok(result);
                            }
                        }
                        anyhow::bail!(error_info);
                    }
                    anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
                }

                pub fn [<get_ $name _or>](
                    &mut self,
                    key: &str,
                    fallback: [$type; $len],
                ) -> anyhow::Result<[$type; $len]> {
                    if self.contains_key(key) {
                        self.[<get_ $name>](key)
                    } else {
                        Ok(fallback)
                    }
                }
            }
        )+
    };
}

impl InputParams {
    pub fn from_json_str(name: &'static str, text: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).context(format!("{} - invalid json", name))?;
        let mut params: Self = value.try_into().context(format!("{} - invalid document", name))?;
        params.set_name(Cow::Borrowed(name));
        Ok(params)
    }

    pub fn set_name(&mut self, name: Cow<'static, str>) {
        self.name = name;
    }

    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Relative file paths are resolved next to `path`.
    pub fn set_base_path(&mut self, path: PathBuf) {
        self.base_path = path;
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    params_get! {
        (int, i32, as_int, "integer"),
        (float, f32, as_float, "float"),
        (bool, bool, as_bool, "boolean"),
    }

    params_get_vec! {
        (int2, i32, 2, as_int, "integer"),
        (float3, f32, 3, as_float, "float"),
    }

    pub fn get_str(&mut self, key: &str) -> anyhow::Result<String> {
        if let Some(value) = self.params.get(key) {
            if let InputParamsValue::String(value) = value {
                self.visited_names.insert(key.to_owned());
                return Ok(value.clone());
            }
            anyhow::bail!(format!("{} - '{}' should be string", self.name, key));
        }
        anyhow::bail!(format!("{} - there is no '{}' field", self.name, key));
    }

    pub fn get_file_path(&mut self, key: &str) -> anyhow::Result<PathBuf> {
        let filename = self.get_str(key)?;
        if Path::new(&filename).is_absolute() {
            return Ok(PathBuf::from(filename));
        }
        Ok(self.base_path.with_file_name(filename))
    }

    pub fn check_unused_keys(&self) {
        for k in self.params.keys() {
            if !k.starts_with('#') && !self.visited_names.contains(k) {
                log::warn!("{} - unused key '{}'", self.name, k);
            }
        }
    }
}

impl TryFrom<serde_json::Value> for InputParamsValue {
    type Error = anyhow::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => {
                anyhow::bail!("can't convert to InputParamsValue from null json")
            }
            serde_json::Value::Bool(v) => Ok(Self::Bool(v)),
            serde_json::Value::Number(v) => {
                if let Some(v) = v.as_i64() {
                    Ok(Self::Int(v as i32))
                } else {
                    let v = v.as_f64().context("number is not representable as f64")?;
                    Ok(Self::Float(v as f32))
                }
            }
            serde_json::Value::String(v) => Ok(Self::String(v)),
            serde_json::Value::Array(arr) => {
                let mut values = Vec::<InputParamsValue>::with_capacity(arr.len());
                for v in arr {
                    match v.try_into() {
                        Ok(v) => values.push(v),
                        Err(e) => {
                            anyhow::bail!(format!("can't convert array element: {}", e))
                        }
                    }
                }
                Ok(Self::Array(values))
            }
            serde_json::Value::Object(_) => {
                anyhow::bail!("can't convert to InputParamsValue from object json")
            }
        }
    }
}

impl TryFrom<serde_json::Value> for InputParams {
    type Error = anyhow::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        if let serde_json::Value::Object(value) = value {
            let mut params = HashMap::<String, InputParamsValue>::with_capacity(value.len());
            for (k, v) in value {
                match v.try_into() {
                    Ok(v) => {
                        params.insert(k, v);
                    }
                    Err(e) => {
                        anyhow::bail!(format!("can't convert member '{}': {}", k, e))
                    }
                }
            }
            Ok(Self {
                params,
                name: Cow::Borrowed(""),
                visited_names: HashSet::new(),
                base_path: PathBuf::default(),
            })
        } else {
            anyhow::bail!("can't convert to InputParams from non-object json value");
        }
    }
}
