//! Customer support desk.
//!
//! ```text
//! analysis ──product──────> product ──────┐
//!          ├─payment──────> payment ──────┤
//!          ├─tech_support─> tech_support ─┤
//!          └─general──────────────────────┴─> final_response ─┬─> feedback_collection ─> END
//!                                                             └─> END
//! ```
//!
//! `analysis` classifies the latest user message with an ordered keyword
//! classifier; each specialist decides a resolution status from the same
//! message; `final_response` answers per status and asks for feedback when
//! the inquiry could not be handled.

use relaygraph_core::{FieldShape, Message, State, StateSchema, StateUpdate};
use relaygraph_graph::{
    ClassifierRouter, END, Graph, KeywordClassifier, NodeHandler, Route, handler_fn, router_fn,
};
use tracing::info;

use crate::error::AgentResult;

pub const ANALYSIS: &str = "analysis";
pub const PRODUCT: &str = "product";
pub const PAYMENT: &str = "payment";
pub const TECH_SUPPORT: &str = "tech_support";
pub const FINAL_RESPONSE: &str = "final_response";
pub const FEEDBACK_COLLECTION: &str = "feedback_collection";

pub const GENERAL: &str = "general";

pub const RESOLVED: &str = "resolved";
pub const PENDING: &str = "pending";
pub const FAILED: &str = "failed";

pub const RESOLVED_REPLY: &str =
    "문의가 성공적으로 처리되었습니다. 더 궁금한 점이 있으시면 언제던지 문의해주세요";
pub const PENDING_REPLY: &str =
    "문의가 접수되었으며 추가 확인이 필요합니다. 곧 담당자가 연락드릴 예정입니다.";
pub const FAILED_REPLY: &str =
    "문의 처리에 어려움이 있어 추가 정보가 필요합니다. 자세한 내용을 알려주시겠어요?";
pub const FEEDBACK_NOTE: &str = "Feedback collected for system improvement.";

/// Inquiry categories in rule order. The first matching rule wins.
pub fn support_classifier() -> KeywordClassifier {
    KeywordClassifier::new(GENERAL)
        .rule(PRODUCT, ["제품", "서비스"])
        .rule(PAYMENT, ["결제", "환불", "청구"])
        .rule(TECH_SUPPORT, ["오류", "작동", "설치"])
}

pub fn support_schema() -> AgentResult<StateSchema> {
    Ok(StateSchema::builder()
        .field(
            "inquiry_type",
            FieldShape::one_of([GENERAL, PRODUCT, PAYMENT, TECH_SUPPORT]),
        )
        .field(
            "resolution_status",
            FieldShape::one_of([PENDING, RESOLVED, FAILED]),
        )
        .field("feedback_needed", FieldShape::Boolean)
        .build()?)
}

pub fn support_graph() -> AgentResult<Graph> {
    let graph = Graph::builder("support")
        .schema(support_schema()?)
        .node(ANALYSIS, analysis_node())
        .node(
            PRODUCT,
            specialist("제품 관련 문의 처리 완료. Status: ", "가격", PENDING),
        )
        .node(
            PAYMENT,
            specialist("결제 관련 문의 처리 완료. Status: ", "환불", PENDING),
        )
        .node(
            TECH_SUPPORT,
            specialist("기술 관련 문의 처리 완료, Status: ", "재설치", FAILED),
        )
        .node(FINAL_RESPONSE, final_response_node())
        .node(FEEDBACK_COLLECTION, feedback_node())
        .entry(ANALYSIS)
        .conditional_edge(
            ANALYSIS,
            ClassifierRouter::new(support_classifier()),
            [
                (PRODUCT, PRODUCT),
                (PAYMENT, PAYMENT),
                (TECH_SUPPORT, TECH_SUPPORT),
                (GENERAL, FINAL_RESPONSE),
            ],
        )
        .edge(PRODUCT, FINAL_RESPONSE)
        .edge(PAYMENT, FINAL_RESPONSE)
        .edge(TECH_SUPPORT, FINAL_RESPONSE)
        .route_by_label(
            FINAL_RESPONSE,
            router_fn([FEEDBACK_COLLECTION], |state: &State| {
                if state.get_bool("feedback_needed").unwrap_or(false) {
                    Route::label(FEEDBACK_COLLECTION)
                } else {
                    Route::End
                }
            }),
        )
        .edge(FEEDBACK_COLLECTION, END)
        .build()?;
    Ok(graph)
}

fn analysis_node() -> impl NodeHandler {
    let classifier = support_classifier();
    handler_fn(move |state: &State| {
        let inquiry_type = classifier.classify(state.latest_user_text()).to_string();
        let mut update = StateUpdate::new().message(Message::assistant(format!(
            "초기 문의 분석: 초기 문의는 {inquiry_type}유형 입니다."
        )));
        if inquiry_type == GENERAL {
            update = update.set("resolution_status", RESOLVED);
        }
        Ok(update.set("inquiry_type", inquiry_type))
    })
}

/// Resolves when the latest user message mentions `resolving_keyword`,
/// otherwise leaves the inquiry at `otherwise`.
fn specialist(
    summary: &'static str,
    resolving_keyword: &'static str,
    otherwise: &'static str,
) -> impl NodeHandler {
    handler_fn(move |state: &State| {
        let status = if state.latest_user_text().contains(resolving_keyword) {
            RESOLVED
        } else {
            otherwise
        };
        Ok(StateUpdate::new()
            .message(Message::assistant(format!("{summary}{status}")))
            .set("resolution_status", status))
    })
}

fn final_response_node() -> impl NodeHandler {
    handler_fn(|state: &State| {
        let status = state.get_str("resolution_status").unwrap_or(PENDING);
        let (reply, feedback_needed) = match status {
            RESOLVED => (RESOLVED_REPLY, false),
            FAILED => (FAILED_REPLY, true),
            _ => (PENDING_REPLY, false),
        };
        Ok(StateUpdate::new()
            .message(Message::assistant(reply))
            .set("feedback_needed", feedback_needed))
    })
}

fn feedback_node() -> impl NodeHandler {
    handler_fn(|state: &State| {
        let first = state
            .history()
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let status = state.get_str("resolution_status").unwrap_or_default();
        info!(first_message = %first, resolution_status = %status, "Support feedback collected");
        Ok(StateUpdate::new().message(Message::assistant(FEEDBACK_NOTE)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_graph::Executor;
    use relaygraph_testing::user_state;
    use rstest::rstest;

    async fn ask(text: &str) -> relaygraph_graph::RunOutcome {
        let graph = support_graph().unwrap();
        Executor::new().run(&graph, user_state(text), None).await
    }

    #[rstest]
    #[case("제품 가격이 궁금합니다", PRODUCT)]
    #[case("서비스 이용 방법", PRODUCT)]
    #[case("환불 요청합니다", PAYMENT)]
    #[case("청구서가 이상해요", PAYMENT)]
    #[case("앱이 작동하지 않아요", TECH_SUPPORT)]
    #[case("안녕하세요", GENERAL)]
    fn test_classification(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(support_classifier().classify(text), expected);
    }

    #[test]
    fn test_rule_order_decides_overlaps() {
        // product is checked before payment
        assert_eq!(support_classifier().classify("서비스 결제 오류"), PRODUCT);
        assert_eq!(support_classifier().classify("결제 오류"), PAYMENT);
    }

    #[tokio::test]
    async fn test_payment_refund_resolves() {
        let outcome = ask("결제한 금액 환불 부탁드립니다").await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.path, vec![ANALYSIS, PAYMENT, FINAL_RESPONSE]);
        assert_eq!(outcome.state.get_str("inquiry_type"), Some(PAYMENT));
        assert_eq!(outcome.state.get_str("resolution_status"), Some(RESOLVED));
        assert_eq!(outcome.reply(), Some(RESOLVED_REPLY));

        let contents: Vec<&str> = outcome
            .state
            .history()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents[1],
            "초기 문의 분석: 초기 문의는 payment유형 입니다."
        );
        assert_eq!(contents[2], "결제 관련 문의 처리 완료. Status: resolved");
    }

    #[tokio::test]
    async fn test_product_without_price_is_pending() {
        let outcome = ask("제품 배송은 언제 되나요").await;
        assert_eq!(outcome.state.get_str("resolution_status"), Some(PENDING));
        assert_eq!(outcome.reply(), Some(PENDING_REPLY));
        assert_eq!(outcome.state.get_bool("feedback_needed"), Some(false));
    }

    #[tokio::test]
    async fn test_failed_tech_support_collects_feedback() {
        let outcome = ask("설치 중 오류가 납니다").await;
        assert_eq!(
            outcome.path,
            vec![ANALYSIS, TECH_SUPPORT, FINAL_RESPONSE, FEEDBACK_COLLECTION]
        );
        assert_eq!(outcome.state.get_str("resolution_status"), Some(FAILED));
        assert_eq!(outcome.state.get_bool("feedback_needed"), Some(true));
        let history = outcome.state.history();
        assert_eq!(history[history.len() - 2].content, FAILED_REPLY);
        assert_eq!(outcome.reply(), Some(FEEDBACK_NOTE));
    }

    #[tokio::test]
    async fn test_reinstall_resolves_tech_support() {
        let outcome = ask("재설치 후에도 오류가 있나요").await;
        assert_eq!(outcome.state.get_str("resolution_status"), Some(RESOLVED));
        assert_eq!(outcome.path.len(), 3);
    }

    #[tokio::test]
    async fn test_general_goes_straight_to_final_response() {
        let outcome = ask("영업시간이 어떻게 되나요").await;
        assert_eq!(outcome.path, vec![ANALYSIS, FINAL_RESPONSE]);
        assert_eq!(outcome.state.get_str("inquiry_type"), Some(GENERAL));
        assert_eq!(outcome.reply(), Some(RESOLVED_REPLY));
    }
}
