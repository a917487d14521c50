//! Built-in operation handlers.
use super::engine::HandlerContext;
use super::registry::Handler;
use crate::error::ConfigError;
use crate::exception_control::Severity;

/// The `use <section>` operation: imports the fully resolved state of another
/// section at this point of the current section.
///
/// Keys set earlier in the current section are overridden by the import,
/// keys set later override the imported values.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseHandler;

impl Handler for UseHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>) -> anyhow::Result<()> {
        let target = ctx.parameter().to_string();
        if target.is_empty() {
            let fault = ConfigError::OptionFormat {
                section: ctx.section().to_string(),
                key: ctx.raw_key().to_string(),
                message: "'use' requires a section name".to_string(),
            };
            ctx.report(Severity::Minor, fault)?;
            return Ok(());
        }

        ctx.debug(2, &format!("[{}] use [{target}]", ctx.section()));
        let imported = ctx.parse_section(&target)?;
        ctx.state_mut().merge(&imported);
        Ok(())
    }
}
