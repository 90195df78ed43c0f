use crate::network::processing::{WriteMode, WriterDescriptor};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Interface written packets are sent through
    #[arg(long = "writer-dest", id = "writer-dest")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_dev: Option<String>,

    /// Where written packets go
    #[arg(long = "writer-mode", id = "writer-mode", value_enum, default_value_t = WriteMode::default())]
    #[serde(default)]
    pub mode: WriteMode,
}

impl WriterOptions {
    /// The write configuration, if a destination is set.
    pub fn to_descriptor(&self) -> Option<WriterDescriptor> {
        self.dest_dev
            .as_ref()
            .map(|dest| WriterDescriptor::new(dest.clone(), self.mode))
    }
}
