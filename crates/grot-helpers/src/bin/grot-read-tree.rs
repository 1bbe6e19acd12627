use std::process::ExitCode;

fn main() -> ExitCode {
    grot_helpers::helper_main(grot_helpers::serve::serve_tree)
}
