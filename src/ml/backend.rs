// Backend selection.
//
// Training runs on Autodiff<InnerBackend>; validation and serving run
// on InnerBackend directly (no gradient tape). The CPU ndarray backend
// is the default, `--features wgpu` switches to the GPU backend.

use burn::prelude::Backend;

#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InnerBackend>;

pub type Device = <InnerBackend as Backend>::Device;

pub fn default_device() -> Device {
    Device::default()
}

/// Short human-readable backend name for logs and checkpoint provenance.
pub fn backend_name() -> &'static str {
    if cfg!(feature = "wgpu") { "wgpu" } else { "ndarray" }
}
