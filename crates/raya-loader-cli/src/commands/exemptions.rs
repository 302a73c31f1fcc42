//! `raya-loader exemptions`: List load and transform exemptions.

use crate::output::StyledOutput;
use crate::setup::LoaderOptions;
use termcolor::ColorChoice;

pub fn execute(options: &LoaderOptions, choice: ColorChoice) -> anyhow::Result<()> {
    let (loader, _) = options.build()?;
    let mut out = StyledOutput::new(choice);

    print_section(&mut out, "Load exemptions", &loader.load_exemptions());
    out.newline();
    print_section(&mut out, "Transform exemptions", &loader.transform_exemptions());
    out.flush();
    Ok(())
}

fn print_section(out: &mut StyledOutput, title: &str, prefixes: &[String]) {
    out.bold(title);
    out.newline();
    if prefixes.is_empty() {
        out.plain("  (none)");
        out.newline();
    }
    for prefix in prefixes {
        out.plain("  ");
        out.info(prefix);
        out.newline();
    }
}
