//! Prompt chain execution.

mod trace;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use trace::{ChainRun, DebugReport, LlmRun, RunId, TraceCollector};

use crate::error::GenerateError;
use crate::llm::{Completion, LlmHandle, Usage};
use crate::prompt::PromptTemplate;

/// Name recorded for chain runs in debug reports.
pub const LLM_CHAIN: &str = "llm_chain";

/// Result of one chain call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOutput {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl From<Completion> for ChainOutput {
    fn from(completion: Completion) -> Self {
        Self {
            text: completion.text,
            finish_reason: completion.finish_reason,
            usage: completion.usage,
        }
    }
}

impl ChainOutput {
    fn as_record(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("text".to_string(), self.text.clone())])
    }
}

/// A prompt template bound to a model handle.
pub struct LlmChain {
    handle: LlmHandle,
    prompt: PromptTemplate,
}

impl LlmChain {
    pub fn new(handle: LlmHandle, prompt: PromptTemplate) -> Self {
        Self { handle, prompt }
    }

    /// Fill the template with `inputs` and run it against the model.
    ///
    /// When `trace` is given, the chain call and the model call it makes are
    /// appended to it.
    pub async fn call(
        &self,
        inputs: &HashMap<String, String>,
        trace: Option<&TraceCollector>,
    ) -> Result<ChainOutput, GenerateError> {
        let Some(collector) = trace else {
            return self.execute(inputs, None).await;
        };

        let run = collector.chain_start(LLM_CHAIN, inputs).await;
        let result = self.execute(inputs, Some((collector, &run))).await;
        match &result {
            Ok(output) => collector.chain_end(&run, output.as_record()).await,
            Err(e) => collector.chain_error(&run, e).await,
        }
        result
    }

    /// Run the chain over several input sets concurrently. The handle's
    /// concurrency cap bounds outstanding model calls. Every input set is
    /// checked before any call is made; outputs come back in input order.
    pub async fn apply(
        &self,
        inputs: &[HashMap<String, String>],
        trace: Option<&TraceCollector>,
    ) -> Result<Vec<ChainOutput>, GenerateError> {
        for values in inputs {
            self.prompt.validate_inputs(values)?;
        }

        futures::future::try_join_all(inputs.iter().map(|values| self.call(values, trace))).await
    }

    async fn execute(
        &self,
        inputs: &HashMap<String, String>,
        trace: Option<(&TraceCollector, &RunId)>,
    ) -> Result<ChainOutput, GenerateError> {
        let prompt = self.prompt.format(inputs)?;
        debug!(model = %self.handle.model_name(), prompt_len = prompt.len(), "Running chain");

        let llm_run = match trace {
            Some((collector, parent)) => Some(
                collector
                    .llm_start(
                        Some(parent),
                        self.handle.model_name(),
                        self.handle.temperature(),
                        &prompt,
                    )
                    .await,
            ),
            None => None,
        };

        let result = self.handle.complete(&prompt).await;

        if let (Some((collector, _)), Some(run)) = (trace, llm_run.as_ref()) {
            match &result {
                Ok(completion) => collector.llm_end(run, completion).await,
                Err(e) => collector.llm_error(run, &e.source, e.attempts).await,
            }
        }

        match result {
            Ok(completion) => Ok(ChainOutput::from(completion)),
            Err(e) => Err(GenerateError::from_call(self.handle.model_name(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::{LLMError, ModelRegistry};
    use crate::prompt::TemplateError;

    const COMPANY: &str = "What is a good name for a company that makes {product}?";

    fn chain(provider: Arc<ScriptedProvider>) -> LlmChain {
        let registry = ModelRegistry::builtin();
        let spec = registry.resolve("gpt-3.5-turbo").unwrap();
        let handle = LlmHandle::new(provider, spec, Duration::ZERO);
        LlmChain::new(handle, PromptTemplate::new(COMPANY, ["product"]).unwrap())
    }

    fn product(value: &str) -> HashMap<String, String> {
        HashMap::from([("product".to_string(), value.to_string())])
    }

    #[tokio::test]
    async fn test_call_fills_template_and_returns_completion() {
        let provider = Arc::new(ScriptedProvider::new().reply("AutoWorks"));
        let chain = chain(provider.clone());

        let output = chain.call(&product("cars"), None).await.unwrap();
        assert_eq!(output.text, "AutoWorks");
        assert_eq!(output.finish_reason.as_deref(), Some("stop"));
        assert_eq!(
            provider.requests()[0].messages[0].content,
            "What is a good name for a company that makes cars?"
        );
    }

    #[tokio::test]
    async fn test_traced_call_records_one_chain_and_one_llm_run() {
        let provider = Arc::new(ScriptedProvider::new().reply("AutoWorks"));
        let chain = chain(provider);
        let collector = TraceCollector::new();

        chain.call(&product("cars"), Some(&collector)).await.unwrap();

        let report = collector.finish();
        assert_eq!(report.chain_call_count, 1);
        assert_eq!(report.llm_call_count, 1);
        assert_eq!(report.chains[0].name, LLM_CHAIN);
        assert_eq!(
            report.chains[0].outputs.as_ref().unwrap()["text"],
            "AutoWorks"
        );
        assert_eq!(
            report.llms[0].parent_run_id.as_deref(),
            Some(report.chains[0].run_id.as_str())
        );
        assert_eq!(report.llms[0].model, "gpt-3.5-turbo");
        assert_eq!(report.llms[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_are_folded_into_one_llm_run() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(LLMError::Api {
                    status: 500,
                    message: "oops".to_string(),
                })
                .reply("AutoWorks"),
        );
        let chain = chain(provider);
        let collector = TraceCollector::new();

        chain.call(&product("cars"), Some(&collector)).await.unwrap();

        let report = collector.finish();
        assert_eq!(report.llm_call_count, 1);
        assert_eq!(report.llms[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_mismatched_inputs_never_reach_the_backend() {
        let provider = Arc::new(ScriptedProvider::new());
        let chain = chain(provider.clone());
        let inputs = HashMap::from([("colour".to_string(), "red".to_string())]);

        let err = chain.call(&inputs, None).await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::PromptTemplateFormat(TemplateError::MissingVariable(_))
        ));
        assert_eq!(provider.chat_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_call_is_recorded_and_returns_no_output() {
        let provider = Arc::new(ScriptedProvider::new().fail(LLMError::Api {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        }));
        let chain = chain(provider);
        let collector = TraceCollector::new();

        let err = chain
            .call(&product("cars"), Some(&collector))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::CredentialInvalid(_)));

        let report = collector.finish();
        assert!(report.chains[0].error.is_some());
        assert!(report.chains[0].outputs.is_none());
        assert!(report.llms[0].error.is_some());
    }

    #[tokio::test]
    async fn test_apply_preserves_input_order() {
        let provider = Arc::new(ScriptedProvider::new().reply_always("name"));
        let chain = chain(provider.clone());
        let collector = TraceCollector::new();
        let inputs = vec![product("cars"), product("boats"), product("bikes")];

        let outputs = chain.apply(&inputs, Some(&collector)).await.unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(provider.chat_calls(), 3);

        let report = collector.finish();
        assert_eq!(report.chain_call_count, 3);
        assert_eq!(report.llm_call_count, 3);
        let traced: Vec<&str> = report
            .chains
            .iter()
            .map(|c| c.inputs["product"].as_str())
            .collect();
        assert_eq!(traced, ["cars", "boats", "bikes"]);
    }

    #[tokio::test]
    async fn test_apply_rejects_bad_entry_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new().reply_always("name"));
        let chain = chain(provider.clone());
        let inputs = vec![product("cars"), HashMap::new()];

        let err = chain.apply(&inputs, None).await.unwrap_err();
        assert!(matches!(err, GenerateError::PromptTemplateFormat(_)));
        assert_eq!(provider.chat_calls(), 0);
    }
}
