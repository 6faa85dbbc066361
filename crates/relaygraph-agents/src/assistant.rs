//! Manual-grounded support assistant.
//!
//! [`KnowledgeBase::setup`] reads the manual once per process; the graph's
//! single node retrieves the best matching passages for each question and
//! asks the completion service to answer from them.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use relaygraph_core::{
    CompletionOptions, CompletionService, HandlerError, Message, State, StateUpdate,
};
use relaygraph_graph::{END, Graph, NodeHandler};
use tracing::{debug, info};

use crate::error::{AgentError, AgentResult};

pub const ANSWER: &str = "answer";

/// Passages are merged up to this many characters.
pub const CHUNK_SIZE: usize = 200;

pub const NOT_FOUND_REPLY: &str =
    "죄송하지만 문의하신 내용에 대해서는 매뉴얼에서 정보를 찾을 수 없습니다.";

/// Passages of a manual with a lexical retriever.
///
/// Scoring is the number of distinct character bigrams (whitespace removed,
/// lowercased) a passage shares with the question, which works for Korean
/// text without a tokenizer. Ties keep manual order.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    passages: Vec<Passage>,
}

#[derive(Debug, Clone)]
struct Passage {
    text: String,
    bigrams: HashSet<(char, char)>,
}

impl KnowledgeBase {
    /// Load and split the manual at `path`.
    pub fn setup(path: impl AsRef<Path>) -> AgentResult<Arc<Self>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AgentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let kb = Self::from_text(&text);
        if kb.is_empty() {
            return Err(AgentError::EmptyManual(path.to_path_buf()));
        }
        info!(path = %path.display(), passages = kb.len(), "Manual loaded");
        Ok(Arc::new(kb))
    }

    pub fn from_text(text: &str) -> Self {
        let passages = split_passages(text, CHUNK_SIZE)
            .into_iter()
            .map(|text| Passage {
                bigrams: bigrams(&text),
                text,
            })
            .collect();
        Self { passages }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> impl Iterator<Item = &str> {
        self.passages.iter().map(|p| p.text.as_str())
    }

    /// Up to `k` passages sharing at least one bigram with `question`,
    /// best first.
    pub fn retrieve(&self, question: &str, k: usize) -> Vec<&str> {
        let query = bigrams(question);
        let mut scored: Vec<(usize, usize)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.bigrams.intersection(&query).count(), i))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.passages[i].text.as_str())
            .collect()
    }
}

/// Split on blank lines, then merge neighbouring paragraphs while the
/// merged passage stays within `chunk_size` characters. A paragraph longer
/// than `chunk_size` stays whole.
fn split_passages(text: &str, chunk_size: usize) -> Vec<String> {
    let mut passages: Vec<String> = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if current.is_empty() {
            current.push_str(paragraph);
        } else if current.chars().count() + 2 + paragraph.chars().count() <= chunk_size {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            passages.push(std::mem::take(&mut current));
            current.push_str(paragraph);
        }
    }
    if !current.is_empty() {
        passages.push(current);
    }
    passages
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

pub fn answer_prompt(context: &[&str], question: &str) -> String {
    let context = context.join("\n\n");
    format!(
        "당신은 코드크래프터스 아카데미의 친절한 고객 지원 담당자입니다.
주어진 컨텍스트 정보를 바탕으로 고객의 질문에 명확하고 친절하게 답변해주세요.
컨텍스트에 질문에 대한 정보가 없다면, '{NOT_FOUND_REPLY}'라고 답변해주세요.

컨텍스트:
{context}

질문:
{question}
"
    )
}

pub fn assistant_graph(
    knowledge: Arc<KnowledgeBase>,
    completion: Arc<dyn CompletionService>,
    top_k: usize,
) -> AgentResult<Graph> {
    let graph = Graph::builder("assistant")
        .node(
            ANSWER,
            ManualAnswer {
                knowledge,
                completion,
                top_k,
            },
        )
        .entry(ANSWER)
        .edge(ANSWER, END)
        .build()?;
    Ok(graph)
}

struct ManualAnswer {
    knowledge: Arc<KnowledgeBase>,
    completion: Arc<dyn CompletionService>,
    top_k: usize,
}

#[async_trait]
impl NodeHandler for ManualAnswer {
    async fn run(&self, state: &State) -> Result<StateUpdate, HandlerError> {
        let question = state.latest_user_text();
        let context = self.knowledge.retrieve(question, self.top_k);
        debug!(passages = context.len(), "Retrieved manual passages");
        let answer = self
            .completion
            .complete(&answer_prompt(&context, question), &CompletionOptions::default())
            .await?;
        Ok(StateUpdate::new().message(Message::assistant(answer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_core::CompletionError;
    use relaygraph_graph::Executor;
    use relaygraph_testing::{ScriptedCompletion, user_state};
    use std::io::Write;

    const MANUAL: &str = "수강 신청은 홈페이지에서 할 수 있습니다.\n\n\
        환불 규정: 개강 후 7일 이내에는 전액 환불됩니다.\n\n\
        수업 시간은 평일 오전 10시부터 오후 6시까지입니다.";

    #[test]
    fn test_small_paragraphs_are_merged() {
        let kb = KnowledgeBase::from_text(MANUAL);
        assert_eq!(kb.len(), 1);

        let long = format!("{}\n\n{}", "가".repeat(150), "나".repeat(150));
        let kb = KnowledgeBase::from_text(&long);
        assert_eq!(kb.len(), 2);
    }

    #[test]
    fn test_retrieve_ranks_by_overlap() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            format!("환불 규정: 개강 후 7일 이내에는 전액 환불됩니다. {}", "-".repeat(150)),
            format!("수업 시간은 평일 오전 10시부터입니다. {}", "-".repeat(150)),
            format!("주차 안내: 건물 지하 주차장을 이용하세요. {}", "-".repeat(150)),
        );
        let kb = KnowledgeBase::from_text(&text);
        assert_eq!(kb.len(), 3);

        let hits = kb.retrieve("환불 규정이 어떻게 되나요?", 2);
        assert!(hits[0].starts_with("환불 규정"));
        assert!(kb.retrieve("zzz", 2).is_empty());
        assert_eq!(kb.retrieve("수업 환불 주차", 5).len(), 3);
    }

    #[test]
    fn test_setup_errors() {
        assert!(matches!(
            KnowledgeBase::setup("/nonexistent/manual.txt"),
            Err(AgentError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\n\n  \n\n").unwrap();
        assert!(matches!(
            KnowledgeBase::setup(file.path()),
            Err(AgentError::EmptyManual(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_node_uses_retrieved_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANUAL.as_bytes()).unwrap();
        let kb = KnowledgeBase::setup(file.path()).unwrap();

        let completion = ScriptedCompletion::always("7일 이내 전액 환불됩니다.");
        let graph = assistant_graph(kb, Arc::new(completion.clone()), 2).unwrap();
        let outcome = Executor::new()
            .run(&graph, user_state("환불 규정 알려주세요"), None)
            .await;

        assert_eq!(outcome.reply(), Some("7일 이내 전액 환불됩니다."));
        let prompt = &completion.prompts()[0];
        assert!(prompt.contains("환불 규정: 개강 후 7일"));
        assert!(prompt.contains("질문:\n환불 규정 알려주세요"));
    }

    #[tokio::test]
    async fn test_completion_failure_aborts() {
        let kb = Arc::new(KnowledgeBase::from_text(MANUAL));
        let completion = ScriptedCompletion::new().with_error(CompletionError::Timeout { elapsed_ms: 1000 });
        let graph = assistant_graph(kb, Arc::new(completion), 2).unwrap();
        let outcome = Executor::new().run(&graph, user_state("질문"), None).await;
        assert!(!outcome.is_completed());
        assert!(outcome.reply().unwrap().starts_with("Run aborted"));
    }
}
