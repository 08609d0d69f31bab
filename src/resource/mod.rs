pub mod adapter;
pub mod path;

pub use adapter::{ResourceAdapter, ResourceView};

/// An addressable calendar object: a single event or a collection.
///
/// Holds a lazy adapter instead of materialized content, so listings that
/// only need metadata never load payloads.
#[derive(Debug, Clone)]
pub struct Resource {
    rpath: String,
    adapter: ResourceAdapter,
}

impl Resource {
    pub(crate) fn new(rpath: String, adapter: ResourceAdapter) -> Self {
        Self { rpath, adapter }
    }

    pub fn path(&self) -> &str {
        &self.rpath
    }

    pub fn is_collection(&self) -> bool {
        path::is_collection(&self.rpath)
    }

    pub fn adapter(&self) -> &ResourceAdapter {
        &self.adapter
    }

    /// Non-failing view for the protocol boundary.
    pub fn view(&self) -> ResourceView<'_> {
        self.adapter.view()
    }
}
