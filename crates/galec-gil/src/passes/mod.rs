//! The GIL pass pipeline.
//!
//! Passes run in configured order, each with enable and print-before/after
//! flags. Unknown pass names warn and are skipped; the pipeline stops early
//! once a pass raises errors.

mod copy_lowering;
mod dce;
mod detect_uninitialized;
mod drop_lowering;
mod erase_copy_on_struct_extract;
mod simplify_copy_to_drop;
mod unreachable_checker;
mod void_main;

use galec_ast::{Ast, TypeArena};
use galec_util::{DiagnosticHandler, Span};

use crate::gil::GilModule;
use crate::printer::print_module;

/// Configuration for one pass.
#[derive(Clone, Debug)]
pub struct PassConfig {
    pub name: String,
    pub enabled: bool,
    pub print_before: bool,
    pub print_after: bool,
}

impl PassConfig {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            print_before: false,
            print_after: false,
        }
    }
}

/// Ordered pass pipeline configuration.
#[derive(Clone, Debug, Default)]
pub struct PassPipelineConfig {
    pub passes: Vec<PassConfig>,
}

impl PassPipelineConfig {
    /// The default pipeline, all passes enabled.
    pub fn create_default() -> Self {
        let passes = [
            "void-main",
            "detect-uninitialized",
            "dead-code-elimination",
            "unreachable-checker",
            "erase-copy-on-struct-extract",
            "simplify-copy-to-drop",
            "copy-lowering",
            "drop-lowering",
        ]
        .into_iter()
        .map(|name| PassConfig::new(name, true))
        .collect();
        Self { passes }
    }

    pub fn get_pass_config(&mut self, name: &str) -> Option<&mut PassConfig> {
        self.passes.iter_mut().find(|p| p.name == name)
    }

    pub fn enable_pass(&mut self, name: &str) {
        if let Some(config) = self.get_pass_config(name) {
            config.enabled = true;
        }
    }

    pub fn disable_pass(&mut self, name: &str) {
        if let Some(config) = self.get_pass_config(name) {
            config.enabled = false;
        }
    }

    pub fn print_before(&mut self, name: &str) {
        if let Some(config) = self.get_pass_config(name) {
            config.print_before = true;
        }
    }

    pub fn print_after(&mut self, name: &str) {
        if let Some(config) = self.get_pass_config(name) {
            config.print_after = true;
        }
    }
}

/// Runs the configured pipeline over a module.
pub struct PassManager {
    config: PassPipelineConfig,
    /// Accumulated print-before/after dumps.
    pub output: String,
}

impl PassManager {
    pub fn new(config: PassPipelineConfig) -> Self {
        Self {
            config,
            output: String::new(),
        }
    }

    /// The pass names this manager recognizes.
    pub fn available_passes() -> &'static [&'static str] {
        &[
            "void-main",
            "detect-uninitialized",
            "dead-code-elimination",
            "unreachable-checker",
            "erase-copy-on-struct-extract",
            "simplify-copy-to-drop",
            "copy-lowering",
            "drop-lowering",
        ]
    }

    pub fn run(
        &mut self,
        module: &mut GilModule,
        types: &mut TypeArena,
        ast: &Ast,
        handler: &DiagnosticHandler,
    ) {
        for config in self.config.passes.clone() {
            if !config.enabled {
                continue;
            }
            if !Self::available_passes().contains(&config.name.as_str()) {
                handler.warning(
                    Span::DUMMY,
                    format!("unknown pass '{}', skipping", config.name),
                );
                continue;
            }

            if config.print_before {
                self.dump(module, types, ast, &format!("GIL before {} pass", config.name));
            }

            match config.name.as_str() {
                "void-main" => void_main::run(module, types, ast),
                "detect-uninitialized" => detect_uninitialized::run(module, handler),
                "dead-code-elimination" => dce::run(module, handler),
                "unreachable-checker" => unreachable_checker::run(module, ast, handler),
                "erase-copy-on-struct-extract" => {
                    erase_copy_on_struct_extract::run(module, types)
                }
                "simplify-copy-to-drop" => simplify_copy_to_drop::run(module),
                "copy-lowering" => copy_lowering::run(module, types, ast),
                "drop-lowering" => drop_lowering::run(module, types, ast),
                _ => {}
            }

            if config.print_after {
                self.dump(module, types, ast, &format!("GIL after {} pass", config.name));
            }

            if handler.has_errors() {
                break;
            }
        }
    }

    fn dump(&mut self, module: &GilModule, types: &TypeArena, ast: &Ast, description: &str) {
        self.output.push_str(&format!("// {description}\n"));
        self.output.push_str(&print_module(module, types, ast));
        self.output.push_str(&format!("// End {description}\n\n"));
    }
}
