use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct GetQuota {
    pub data: HashMap<String, Value>,
}

impl GetQuota {
    /// Numeric quota values; anything non-numeric is dropped.
    pub fn numeric(&self) -> HashMap<String, f64> {
        self.data
            .iter()
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.to_owned(), v)))
            .collect()
    }
}
