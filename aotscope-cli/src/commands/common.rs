use anyhow::Context;
use aotscope::{AnalysisOptions, AotObject};

use crate::app::ImageArgs;

/// Open the executable and run header parsing, rehydration and (optionally) string discovery.
pub fn load_image(args: &ImageArgs) -> anyhow::Result<AotObject> {
    let options = AnalysisOptions {
        scan_strings: !args.no_strings,
        ..AnalysisOptions::default()
    };
    AotObject::from_file(&args.path, args.header, options).with_context(|| {
        format!(
            "failed to load {} with the runtime header at {:#x}",
            args.path.display(),
            args.header
        )
    })
}
