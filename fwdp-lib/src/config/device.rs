use serde::Deserialize;

/// One NIC device slot (spec.md §4.10 "input_device"/"output_device").
/// `index` is the bit position used by ACL rules' `devices` mask and by
/// [`crate::pipeline::PacketDescriptor::input_device`].
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub index: u16,
    pub name: String,
}
