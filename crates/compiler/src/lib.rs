//! Shadow compilation and bundling seams for the Pagesmith panel.
//! Pagesmith 面板的影子編譯與打包介面。

pub mod bundle;
pub mod shadow;
pub mod target;

pub use bundle::{pre_bundle, BundleError, BundleService, HttpBundleService, BUNDLE_NODE_ID};
pub use shadow::{ShadowCompiler, ShadowError};
pub use target::{CommandCompiler, Compile, PassthroughCompiler, TargetVersion};
