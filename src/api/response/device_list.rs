use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    pub sn: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /* 1 online, 0 offline */
    #[serde(default)]
    pub online: u8,
}

#[derive(Debug, Deserialize)]
pub struct GetDeviceList {
    /* absent on error replies */
    pub data: Option<Vec<Data>>,
}

impl GetDeviceList {
    pub fn find(&self, serial_number: &str) -> Option<&Data> {
        self.data
            .as_ref()?
            .iter()
            .find(|device| device.sn == serial_number)
    }
}
