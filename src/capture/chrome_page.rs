//! Page function evaluation over the Chrome DevTools Protocol.

use crate::capability::{EvaluateOptions, PageExecutor, PageFunction};
use crate::types::{GatherError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CreateIsolatedWorldParams;
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::Page;
use serde_json::Value;
use tracing::debug;

/// Name of the isolated world page functions run in.
const ISOLATED_WORLD_NAME: &str = "__scriptgather_isolated";

/// Collects every element matching `selector`, descending into open shadow roots.
const ELEMENTS_IN_DOCUMENT: &str = r#"
function getElementsInDocument(selector) {
  const matches = Element.prototype.matches;
  const results = [];
  const walk = nodes => {
    for (const el of nodes) {
      if (matches.call(el, selector)) results.push(el);
      if (el.shadowRoot) walk(el.shadowRoot.querySelectorAll('*'));
    }
  };
  walk(document.querySelectorAll('*'));
  return results;
}
"#;

/// Page-side source for a page function.
pub fn page_function_source(function: PageFunction) -> String {
    match function {
        PageFunction::InlineScriptTexts => format!(
            r#"(() => {{
  {elements}
  return getElementsInDocument('script')
    .filter(script => !script.getAttribute('src') && script.text.trim())
    .map(script => script.text.trim());
}})()"#,
            elements = ELEMENTS_IN_DOCUMENT
        ),
    }
}

/// A live Chrome page that can run page functions.
#[derive(Clone)]
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Create a fresh isolated world in the main frame.
    async fn isolated_context(&self) -> Result<ExecutionContextId> {
        let frame_id = self
            .page
            .mainframe()
            .await
            .map_err(|e| GatherError::Execution(format!("Failed to resolve main frame: {}", e)))?
            .ok_or_else(|| GatherError::Execution("Page has no main frame".to_string()))?;

        let params = CreateIsolatedWorldParams::builder()
            .frame_id(frame_id)
            .world_name(ISOLATED_WORLD_NAME)
            .build()
            .map_err(GatherError::Execution)?;

        let world = self
            .page
            .execute(params)
            .await
            .map_err(|e| GatherError::Execution(format!("Failed to create isolated world: {}", e)))?;

        Ok(world.execution_context_id.clone())
    }
}

#[async_trait]
impl PageExecutor for ChromePage {
    async fn evaluate(&self, function: PageFunction, options: EvaluateOptions) -> Result<Value> {
        let mut builder = EvaluateParams::builder()
            .expression(page_function_source(function))
            .return_by_value(true)
            .await_promise(true);

        if options.use_isolation {
            builder = builder.context_id(self.isolated_context().await?);
        }

        let params = builder.build().map_err(GatherError::Execution)?;

        debug!("Evaluating {:?} (isolated: {})", function, options.use_isolation);
        let response = self
            .page
            .execute(params)
            .await
            .map_err(|e| GatherError::Execution(e.to_string()))?;

        let evaluated = &response.result;
        if let Some(ref details) = evaluated.exception_details {
            let message = details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or_else(|| details.text.clone());
            return Err(GatherError::Execution(message));
        }

        Ok(evaluated.result.value.clone().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_source_matches_expected_expression() {
        let expected = "(() => {
  
function getElementsInDocument(selector) {
  const matches = Element.prototype.matches;
  const results = [];
  const walk = nodes => {
    for (const el of nodes) {
      if (matches.call(el, selector)) results.push(el);
      if (el.shadowRoot) walk(el.shadowRoot.querySelectorAll('*'));
    }
  };
  walk(document.querySelectorAll('*'));
  return results;
}

  return getElementsInDocument('script')
    .filter(script => !script.getAttribute('src') && script.text.trim())
    .map(script => script.text.trim());
})()";
        assert_eq!(page_function_source(PageFunction::InlineScriptTexts), expected);
    }
}
