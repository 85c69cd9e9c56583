//! Saving and budget plan interviews
//!
//! The model writes five questions, the user answers them one message at a
//! time, then the model turns the transcript into a structured plan that
//! replaces the stored one when the user saves it.

use crate::assistant::{Assistant, AssistantTurn, QuestionProgress, TurnKind};
use crate::context::{
    budget_plan_schema, question_list_schema, saving_plan_schema, strip_code_fences, system_prompt,
};
use crate::currency::format_currency;
use crate::error::AssistantError;
use crate::llm::ModelRequest;
use crate::models::{BudgetItem, SavingGoal};
use crate::session::{AssistantMode, AssistantSession, PlanSession};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Saving,
    Budget,
}

impl PlanKind {
    pub fn mode(self) -> AssistantMode {
        match self {
            PlanKind::Saving => AssistantMode::SavingPlan,
            PlanKind::Budget => AssistantMode::BudgetPlan,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PlanKind::Saving => "savings",
            PlanKind::Budget => "budget",
        }
    }

    fn questions_prompt(self, name: &str) -> String {
        match self {
            PlanKind::Saving => format!(
                "Generate 5 personalized, intelligent questions for {} to create a comprehensive savings plan. \
                 Questions should be based on their current financial situation and spending patterns. \
                 Make questions specific and data-driven.",
                name
            ),
            PlanKind::Budget => format!(
                "Generate 5 personalized questions for {} to create a detailed monthly budget based on their \
                 spending patterns. Questions should help understand their priorities and constraints.",
                name
            ),
        }
    }

    fn plan_prompt(self, name: &str) -> String {
        match self {
            PlanKind::Saving => format!(
                "Create a detailed, personalized savings plan for {} based on their Q&A responses and financial data. \
                 Consider their income, expenses, and goals mentioned. Use compact currency format (L/CR/K).",
                name
            ),
            PlanKind::Budget => format!(
                "Create a comprehensive, realistic monthly budget for {} based on their Q&A responses and spending \
                 patterns. Allocate budget intelligently based on their priorities. Use compact currency format (L/CR/K).",
                name
            ),
        }
    }

    fn schema(self) -> Value {
        match self {
            PlanKind::Saving => saving_plan_schema(),
            PlanKind::Budget => budget_plan_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum GeneratedPlan {
    Saving(Vec<SavingGoal>),
    Budget(Vec<BudgetItem>),
}

impl GeneratedPlan {
    fn parse(kind: PlanKind, raw: &str) -> Result<Self> {
        let cleaned = strip_code_fences(raw);
        let plan = match kind {
            PlanKind::Saving => GeneratedPlan::Saving(serde_json::from_str(&cleaned).map_err(|e| {
                AssistantError::InvalidModelReply(format!("savings plan: {}", e))
            })?),
            PlanKind::Budget => GeneratedPlan::Budget(serde_json::from_str(&cleaned).map_err(|e| {
                AssistantError::InvalidModelReply(format!("budget plan: {}", e))
            })?),
        };
        if plan.is_empty() {
            return Err(AssistantError::InvalidModelReply("plan has no items".to_string()));
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GeneratedPlan::Saving(goals) => goals.is_empty(),
            GeneratedPlan::Budget(items) => items.is_empty(),
        }
    }

    /// Sum of target amounts, or of budgeted amounts
    pub fn total(&self) -> f64 {
        match self {
            GeneratedPlan::Saving(goals) => goals.iter().map(|g| g.target_amount).sum(),
            GeneratedPlan::Budget(items) => items.iter().map(|i| i.budgeted_amount).sum(),
        }
    }

    fn render(&self) -> String {
        match self {
            GeneratedPlan::Saving(goals) => {
                let mut out = String::from("Your personalized savings plan:\n");
                for (i, goal) in goals.iter().enumerate() {
                    out.push_str(&format!(
                        "\n{}. **{}**\nTarget: {} | Monthly: {} | Timeline: {}\n",
                        i + 1,
                        goal.goal_title,
                        format_currency(goal.target_amount, true),
                        format_currency(goal.monthly_contribution, true),
                        goal.timeline
                    ));
                    if !goal.description.is_empty() {
                        out.push_str(&goal.description);
                        out.push('\n');
                    }
                    for step in &goal.steps {
                        out.push_str(&format!("- {}\n", step));
                    }
                }
                out.push_str(&format!("\nTotal target: {}", format_currency(self.total(), true)));
                out
            }
            GeneratedPlan::Budget(items) => {
                let mut out = String::from("Your monthly budget plan:\n\n");
                for item in items {
                    out.push_str(&format!(
                        "- **{}**: {}",
                        item.category,
                        format_currency(item.budgeted_amount, true)
                    ));
                    if let Some(current) = item.current_spending {
                        out.push_str(&format!(" (currently {})", format_currency(current, true)));
                    }
                    out.push('\n');
                    if !item.suggestion.is_empty() {
                        out.push_str(&format!("  {}\n", item.suggestion));
                    }
                }
                out.push_str(&format!(
                    "\nTotal monthly budget: {}",
                    format_currency(self.total(), true)
                ));
                out
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanSummary {
    pub plan: GeneratedPlan,
    pub total: f64,
}

fn question_turn(plan: &PlanSession, intro: Option<String>, undo_available: usize) -> AssistantTurn {
    let number = plan.answers.len() + 1;
    let question = plan.current_question().unwrap_or_default().to_string();
    let progress = format!("Question {} of {}\n{}", number, plan.questions.len(), question);
    let message = match intro {
        Some(intro) => format!("{}\n\n{}", intro, progress),
        None => progress,
    };

    let mut turn = AssistantTurn::new(TurnKind::PlanQuestion, message, undo_available);
    turn.question = Some(QuestionProgress {
        number,
        total: plan.questions.len(),
        question,
    });
    turn
}

impl Assistant {
    pub async fn start_plan(&self, user_id: Uuid, kind: PlanKind) -> Result<AssistantTurn> {
        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;

        let (profile, _, ctx) = self.load_context(user_id, session.last_touched).await?;
        let api_key = self.api_key(&profile)?;

        session.conversation.clear();
        session.pending = None;
        session.awaiting_amount = None;

        let prompt = system_prompt(&ctx, &[], &kind.questions_prompt(&ctx.user_name), None);
        let raw = self
            .model
            .generate(ModelRequest::json(prompt, question_list_schema(), api_key))
            .await?;

        let questions: Vec<String> = serde_json::from_str::<Vec<String>>(&strip_code_fences(&raw))
            .map_err(|e| AssistantError::InvalidModelReply(format!("plan questions: {}", e)))?
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        if questions.is_empty() {
            return Err(AssistantError::InvalidModelReply(
                "no plan questions returned".to_string(),
            ));
        }

        info!(user_id = %user_id, kind = ?kind, questions = questions.len(), "Plan interview started");

        let plan = PlanSession::new(kind, questions);
        let intro = format!(
            "Let's create your personalized {} plan, {}!",
            kind.label(),
            ctx.user_name
        );
        let turn = question_turn(&plan, Some(intro), session.undo.len());

        session.mode = kind.mode();
        session.plan = Some(plan);
        Ok(turn)
    }

    pub async fn answer_plan(&self, user_id: Uuid, answer: &str) -> Result<AssistantTurn> {
        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;
        self.answer_plan_in(&mut session, user_id, answer.trim()).await
    }

    pub(crate) async fn answer_plan_in(
        &self,
        session: &mut AssistantSession,
        user_id: Uuid,
        answer: &str,
    ) -> Result<AssistantTurn> {
        let undo_available = session.undo.len();
        let last_touched = session.last_touched;

        let plan = session
            .plan
            .as_mut()
            .ok_or_else(|| AssistantError::PlanNotActive("no plan interview in progress".to_string()))?;
        if plan.is_complete() {
            return Err(AssistantError::PlanNotActive(
                "all questions are answered; save the plan or start over".to_string(),
            ));
        }

        plan.answers.push(answer.to_string());
        if !plan.is_complete() {
            return Ok(question_turn(plan, None, undo_available));
        }

        let kind = plan.kind;
        let transcript = plan.transcript();

        match self.generate_plan(user_id, kind, &transcript, last_touched).await {
            Ok(generated) => {
                let message = generated.render();
                let summary = PlanSummary {
                    total: generated.total(),
                    plan: generated.clone(),
                };
                plan.generated = Some(generated);

                info!(user_id = %user_id, kind = ?kind, total = summary.total, "Plan generated");
                let mut turn = AssistantTurn::new(TurnKind::PlanReady, message, undo_available);
                turn.plan = Some(summary);
                Ok(turn)
            }
            Err(e) => {
                // the last answer can be sent again
                plan.answers.pop();
                warn!(user_id = %user_id, error = %e, "Plan generation failed");
                Err(e)
            }
        }
    }

    async fn generate_plan(
        &self,
        user_id: Uuid,
        kind: PlanKind,
        transcript: &str,
        last_touched: Option<Uuid>,
    ) -> Result<GeneratedPlan> {
        let (profile, _, ctx) = self.load_context(user_id, last_touched).await?;
        let api_key = self.api_key(&profile)?;

        let instructions = format!(
            "Based on this Q&A session:\n{}\n\nAnd the user's financial data, create a comprehensive {} plan in JSON format.\n\
             Be specific and actionable. Consider their actual spending patterns and income.\n\
             Use compact currency format (L for Lakhs, CR for Crores, K for Thousands) in descriptions.",
            transcript,
            kind.label()
        );
        let prompt = system_prompt(&ctx, &[], &kind.plan_prompt(&ctx.user_name), Some(&instructions));

        let raw = self
            .model
            .generate(ModelRequest::json(prompt, kind.schema(), api_key))
            .await?;
        GeneratedPlan::parse(kind, &raw)
    }

    pub async fn save_plan(&self, user_id: Uuid) -> Result<AssistantTurn> {
        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;

        let generated = session
            .plan
            .as_ref()
            .and_then(|p| p.generated.clone())
            .ok_or_else(|| AssistantError::PlanNotActive("no generated plan to save".to_string()))?;

        let message = match &generated {
            GeneratedPlan::Saving(goals) => {
                let now = self.clock.now();
                let goals: Vec<SavingGoal> = goals
                    .iter()
                    .cloned()
                    .map(|mut goal| {
                        goal.saved_amount = 0.0;
                        goal.contributions.clear();
                        goal.created_at = Some(now);
                        goal
                    })
                    .collect();
                self.store.save_saving_goals(user_id, &goals).await?;
                format!("Your savings plan with {} goal(s) has been saved!", goals.len())
            }
            GeneratedPlan::Budget(items) => {
                self.store.save_budget(user_id, items).await?;
                format!("Your budget plan with {} categories has been saved!", items.len())
            }
        };

        session.plan = None;
        session.mode = AssistantMode::Analysis;

        info!(user_id = %user_id, "Plan saved");
        Ok(AssistantTurn::new(TurnKind::Reply, message, session.undo.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_budget_plan_with_fences() {
        let raw = "```json\n[{\"category\":\"Food\",\"budgetedAmount\":6000,\"suggestion\":\"Cook more\"},\
                   {\"category\":\"Travel\",\"budgetedAmount\":2000}]\n```";
        let plan = GeneratedPlan::parse(PlanKind::Budget, raw).unwrap();
        assert_eq!(plan.total(), 8000.0);

        let rendered = plan.render();
        assert!(rendered.contains("- **Food**: ₹6.0K\n  Cook more"));
        assert!(rendered.ends_with("Total monthly budget: ₹8.0K"));
    }

    #[test]
    fn test_parse_rejects_empty_or_wrong_shape() {
        assert!(matches!(
            GeneratedPlan::parse(PlanKind::Saving, "[]"),
            Err(AssistantError::InvalidModelReply(_))
        ));
        assert!(GeneratedPlan::parse(PlanKind::Saving, "{\"goal\": 1}").is_err());
    }

    #[test]
    fn test_saving_plan_serializes_tagged() {
        let plan = GeneratedPlan::parse(
            PlanKind::Saving,
            r#"[{"goalTitle":"Emergency fund","targetAmount":300000,"monthlyContribution":10000,
                 "timeline":"30 months","description":"Six months of expenses","steps":["Automate transfers"]}]"#,
        )
        .unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["kind"], "saving");
        assert_eq!(json["items"][0]["goalTitle"], "Emergency fund");
        assert!(plan.render().contains("Target: ₹3.0L | Monthly: ₹10.0K | Timeline: 30 months"));
    }
}
