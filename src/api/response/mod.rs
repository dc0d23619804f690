pub mod device_list;
pub mod quota;

use serde::Deserialize;

/* Envelope shared by every reply; `code` is "0" on success */
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code.as_deref().map_or(true, |code| code == "0")
    }
}
