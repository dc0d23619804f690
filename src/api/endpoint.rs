pub type Endpoint = str;

pub const DEVICE_LIST: &Endpoint = "/iot-open/sign/device/list";
/* POST reads quotas, PUT sets them */
pub const DEVICE_QUOTA: &Endpoint = "/iot-open/sign/device/quota";
