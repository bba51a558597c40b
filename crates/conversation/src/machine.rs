//! The conversation machine: one inbound message in, one reply out.

use std::sync::Arc;

use chrono::Utc;
use common::Msisdn;
use domain::instrument::{parse_account, parse_business_number, parse_till_number};
use domain::parse::{parse_due_date, parse_line_items};
use domain::{
    InstrumentKind, InvoiceTotals, MIN_INVOICE_TOTAL_CENTS, Money, PaymentMethod,
    PaymentMethodService,
};
use entity_store::{Entity, EntityStore, EntityStoreExt, Expected, StoreError, Version};

use crate::draft::{CompletedDraft, ConversationState};
use crate::error::ConversationError;
use crate::step::{Step, predecessor_of};

const MAX_CONFLICT_RETRIES: usize = 5;

const GREETING: &str = "Let's create a new invoice. What's your business name?";
const CANCELLED: &str = "Invoice cancelled. Send any message to start a new one.";
const RESET: &str = "Something went wrong with this draft, so it was discarded. Let's start over.";

/// An outbound reply, with the undo affordance where it applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub undo: bool,
}

impl Reply {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            undo: false,
        }
    }
}

/// The result of feeding one inbound message to the machine.
#[derive(Debug)]
pub enum Outcome {
    /// The conversation continues; send this reply.
    Prompt(Reply),

    /// The draft is complete and the session cleared. The caller turns
    /// the draft into an invoice and composes its own replies.
    Completed(CompletedDraft),

    /// The merchant cancelled; the session is cleared.
    Cancelled(Reply),
}

/// Drives guided invoice drafting, persisting one conversation per
/// merchant phone number.
pub struct ConversationMachine<S: EntityStore> {
    store: Arc<S>,
    methods: PaymentMethodService<S>,
}

impl<S: EntityStore> ConversationMachine<S> {
    pub fn new(store: Arc<S>) -> Self {
        let methods = PaymentMethodService::new(store.clone());
        Self { store, methods }
    }

    /// Processes one inbound message from `owner`.
    ///
    /// Saves are guarded by the version loaded at the start of the
    /// turn, so interleaved deliveries for the same owner serialize:
    /// the loser reloads the winner's state and processes against it.
    #[tracing::instrument(skip(self, input), fields(owner = %owner))]
    pub async fn advance(
        &self,
        owner: &Msisdn,
        input: &str,
    ) -> Result<Outcome, ConversationError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            match self.advance_once(owner, input).await {
                Err(ConversationError::Store(e)) if e.is_conflict() => {
                    metrics::counter!("conversation_update_conflicts_total").increment(1);
                    continue;
                }
                other => return other,
            }
        }
        Err(ConversationError::ConflictRetriesExhausted {
            owner: owner.to_string(),
        })
    }

    async fn advance_once(
        &self,
        owner: &Msisdn,
        input: &str,
    ) -> Result<Outcome, ConversationError> {
        let loaded = match self.store.load::<ConversationState>(owner.as_str()).await {
            Ok(loaded) => loaded,
            // A stored step or draft we no longer understand: fail closed.
            Err(StoreError::Serialization(e)) => {
                tracing::error!(error = %e, "unreadable conversation state, resetting session");
                return Ok(Outcome::Prompt(self.reset(owner).await?));
            }
            Err(e) => return Err(e.into()),
        };

        let Some((mut state, version)) = loaded else {
            // First contact starts a fresh draft; the message itself is
            // only the trigger.
            let state = ConversationState::new(owner.clone());
            self.store.save(&state, Expected::New).await?;
            metrics::counter!("conversations_started_total").increment(1);
            return Ok(Outcome::Prompt(Reply::text_only(GREETING)));
        };

        let trimmed = input.trim();
        let token = trimmed.to_lowercase();

        if token == "cancel" {
            self.clear(owner).await?;
            metrics::counter!("conversations_cancelled_total").increment(1);
            return Ok(Outcome::Cancelled(Reply::text_only(CANCELLED)));
        }

        if token == "undo" {
            return self.undo(&mut state, version).await;
        }

        self.collect(&mut state, version, trimmed).await
    }

    /// Moves exactly one step back, discarding only the fields of the
    /// step being left.
    async fn undo(
        &self,
        state: &mut ConversationState,
        version: Version,
    ) -> Result<Outcome, ConversationError> {
        match predecessor_of(state.step, &state.draft) {
            Err(e) => {
                // Not a validation miss: the session itself is broken.
                tracing::error!(step = %state.step, error = %e, "undo unresolvable, resetting session");
                metrics::counter!("conversation_resets_total").increment(1);
                Ok(Outcome::Prompt(self.reset(&state.owner).await?))
            }
            Ok(None) => {
                tracing::debug!(step = %state.step, "undo unavailable at this step");
                let prompt = self.prompt_for(state).await?;
                Ok(Outcome::Prompt(Reply {
                    text: format!("Nothing to undo here.\n\n{}", prompt.text),
                    undo: prompt.undo,
                }))
            }
            Ok(Some(previous)) => {
                state.draft.clear_step(state.step);
                state.step = previous;
                state.updated_at = Utc::now();
                self.store.save(state, Expected::Version(version)).await?;
                metrics::counter!("conversation_undos_total").increment(1);
                Ok(Outcome::Prompt(self.prompt_for(state).await?))
            }
        }
    }

    /// Validates the input for the current step and moves forward.
    async fn collect(
        &self,
        state: &mut ConversationState,
        version: Version,
        input: &str,
    ) -> Result<Outcome, ConversationError> {
        let next = match state.step {
            Step::MerchantName => match parse_name(input) {
                Ok(name) => {
                    state.draft.merchant_name = Some(name);
                    Step::LineItems
                }
                Err(msg) => return self.reprompt(state, &msg).await,
            },
            Step::LineItems => match parse_line_items(input) {
                Ok(items) => {
                    let subtotal = InvoiceTotals::compute(&items, false).subtotal;
                    if subtotal.cents() < MIN_INVOICE_TOTAL_CENTS {
                        return self
                            .reprompt(
                                state,
                                &format!(
                                    "The total must be at least {}.",
                                    Money::from_cents(MIN_INVOICE_TOTAL_CENTS)
                                ),
                            )
                            .await;
                    }
                    state.draft.line_items = Some(items);
                    Step::TaxElection
                }
                Err(e) => return self.reprompt(state, &e.to_string()).await,
            },
            Step::TaxElection => match parse_yes_no(input) {
                Some(elected) => {
                    state.draft.tax_elected = Some(elected);
                    Step::DueDate
                }
                None => return self.reprompt(state, "Please reply yes or no.").await,
            },
            Step::DueDate => match parse_due_date(input, Utc::now().date_naive()) {
                Ok(due) => {
                    state.draft.due = Some(due);
                    Step::CustomerPhone
                }
                Err(e) => return self.reprompt(state, &e.to_string()).await,
            },
            Step::CustomerPhone => match Msisdn::parse(input) {
                Ok(msisdn) => {
                    state.draft.customer_msisdn = Some(msisdn);
                    Step::CustomerName
                }
                Err(_) => {
                    return self
                        .reprompt(state, "That doesn't look like a phone number. Try 0712345678.")
                        .await;
                }
            },
            Step::CustomerName => match parse_name(input) {
                Ok(name) => {
                    state.draft.customer_name = Some(name);
                    Step::InstrumentKind
                }
                Err(msg) => return self.reprompt(state, &msg).await,
            },
            Step::InstrumentKind => match self.collect_instrument_kind(state, input).await? {
                Ok(next) => next,
                Err(msg) => return self.reprompt(state, &msg).await,
            },
            Step::PaybillNumber => match parse_business_number(input) {
                Ok(number) => {
                    state.draft.business_number = Some(number);
                    Step::PaybillAccount
                }
                Err(e) => return self.reprompt(state, &e.to_string()).await,
            },
            Step::PaybillAccount => match parse_account(input) {
                Ok(account) => {
                    state.draft.account = Some(account);
                    Step::SaveInstrument
                }
                Err(e) => return self.reprompt(state, &e.to_string()).await,
            },
            Step::TillNumber => match parse_till_number(input) {
                Ok(number) => {
                    state.draft.till_number = Some(number);
                    Step::SaveInstrument
                }
                Err(e) => return self.reprompt(state, &e.to_string()).await,
            },
            Step::PayoutPhone => match Msisdn::parse(input) {
                Ok(msisdn) => {
                    state.draft.payout_msisdn = Some(msisdn);
                    Step::SaveInstrument
                }
                Err(_) => {
                    return self
                        .reprompt(state, "That doesn't look like a phone number. Try 0712345678.")
                        .await;
                }
            },
            Step::SaveInstrument => match parse_yes_no(input) {
                Some(save) => {
                    state.draft.save_instrument = Some(save);
                    Step::Confirm
                }
                None => return self.reprompt(state, "Please reply yes or no.").await,
            },
            Step::Confirm => {
                if input.eq_ignore_ascii_case("confirm") {
                    return self.complete(state).await;
                }
                return self
                    .reprompt(state, "Reply confirm to send the invoice, or cancel to abandon it.")
                    .await;
            }
        };

        state.step = next;
        state.updated_at = Utc::now();
        self.store.save(state, Expected::Version(version)).await?;
        Ok(Outcome::Prompt(self.prompt_for(state).await?))
    }

    /// Instrument-kind input: a kind token, or a number picking a saved
    /// method (which skips straight to the preview).
    async fn collect_instrument_kind(
        &self,
        state: &mut ConversationState,
        input: &str,
    ) -> Result<Result<Step, String>, ConversationError> {
        let token = input.to_lowercase();
        let next = match token.as_str() {
            "paybill" => {
                state.draft.instrument_kind = Some(InstrumentKind::Paybill);
                Step::PaybillNumber
            }
            "till" => {
                state.draft.instrument_kind = Some(InstrumentKind::Till);
                Step::TillNumber
            }
            "phone" => {
                state.draft.instrument_kind = Some(InstrumentKind::Phone);
                Step::PayoutPhone
            }
            _ => {
                let Ok(choice) = token.parse::<usize>() else {
                    return Ok(Err(
                        "Reply paybill, till or phone, or the number of a saved method."
                            .to_string(),
                    ));
                };
                let saved = self.methods.list_for_merchant(&state.owner).await?;
                let Some(method) = choice.checked_sub(1).and_then(|i| saved.get(i)) else {
                    return Ok(Err("That's not one of the saved methods.".to_string()));
                };
                state.draft.instrument_kind = Some(method.instrument.kind());
                state.draft.saved_instrument = Some(method.instrument.clone());
                Step::Confirm
            }
        };
        Ok(Ok(next))
    }

    /// Finalizes the draft at the preview step.
    async fn complete(&self, state: &mut ConversationState) -> Result<Outcome, ConversationError> {
        match state.draft.complete() {
            Some(draft) => {
                self.clear(&state.owner).await?;
                metrics::counter!("conversations_completed_total").increment(1);
                Ok(Outcome::Completed(draft))
            }
            None => {
                tracing::error!(step = %state.step, "confirm reached with incomplete draft, resetting session");
                metrics::counter!("conversation_resets_total").increment(1);
                Ok(Outcome::Prompt(self.reset(&state.owner).await?))
            }
        }
    }

    /// Invalid input: log, keep state untouched, re-prompt the same step.
    async fn reprompt(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<Outcome, ConversationError> {
        tracing::debug!(step = %state.step, "input rejected: {message}");
        metrics::counter!("conversation_validation_misses_total").increment(1);
        let prompt = self.prompt_for(state).await?;
        Ok(Outcome::Prompt(Reply {
            text: format!("{message}\n\n{}", prompt.text),
            undo: prompt.undo,
        }))
    }

    /// Renders the prompt for the current step.
    async fn prompt_for(&self, state: &ConversationState) -> Result<Reply, ConversationError> {
        let text = match state.step {
            Step::MerchantName => GREETING.to_string(),
            Step::LineItems => {
                "List the items, one per line, as name - price - quantity:\n\nDeep clean - 1500 - 1"
                    .to_string()
            }
            Step::TaxElection => "Do the prices include 16% VAT? (yes/no)".to_string(),
            Step::DueDate => {
                "When is it due? Reply 0 for on receipt, a number of days, or a date like 15/09."
                    .to_string()
            }
            Step::CustomerPhone => "What's the customer's phone number?".to_string(),
            Step::CustomerName => "What's the customer's name?".to_string(),
            Step::InstrumentKind => {
                let saved = self.methods.list_for_merchant(&state.owner).await?;
                instrument_kind_prompt(&saved)
            }
            Step::PaybillNumber => "Enter the paybill business number (5-7 digits).".to_string(),
            Step::PaybillAccount => {
                "Enter the account number customers should quote.".to_string()
            }
            Step::TillNumber => "Enter the till number (5-7 digits).".to_string(),
            Step::PayoutPhone => "Enter the phone number that receives the payment.".to_string(),
            Step::SaveInstrument => {
                "Save these payment details for your next invoice? (yes/no)".to_string()
            }
            Step::Confirm => format!(
                "{}\n\nReply confirm to send the invoice, or cancel to abandon it.",
                render_preview(state)
            ),
        };
        Ok(Reply {
            text,
            undo: state.step.allows_undo(),
        })
    }

    /// Clears the session and starts a fresh one.
    async fn reset(&self, owner: &Msisdn) -> Result<Reply, ConversationError> {
        self.clear(owner).await?;
        let state = ConversationState::new(owner.clone());
        match self.store.save(&state, Expected::New).await {
            Ok(_) => {}
            // A concurrent delivery recreated the session; it is just
            // as fresh as ours.
            Err(e) if e.is_conflict() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Reply::text_only(format!("{RESET}\n\n{GREETING}")))
    }

    async fn clear(&self, owner: &Msisdn) -> Result<(), ConversationError> {
        self.store
            .delete(ConversationState::KIND, owner.as_str())
            .await?;
        Ok(())
    }
}

fn instrument_kind_prompt(saved: &[PaymentMethod]) -> String {
    let mut text =
        "How do you want to be paid? Reply paybill, till or phone.".to_string();
    if !saved.is_empty() {
        text.push_str("\n\nOr pick a saved method:");
        for (index, method) in saved.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", index + 1, method.instrument.describe()));
        }
    }
    text
}

fn parse_name(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.len() < 2 || trimmed.len() > 60 {
        return Err("The name must be 2-60 characters.".to_string());
    }
    Ok(trimmed.to_string())
}

fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

/// Renders the invoice preview shown at the confirm step.
fn render_preview(state: &ConversationState) -> String {
    let draft = &state.draft;
    let items = draft.line_items.as_deref().unwrap_or(&[]);
    let totals = InvoiceTotals::compute(items, draft.tax_elected.unwrap_or(false));

    let mut text = String::from("Invoice preview\n\n");
    text.push_str(&format!(
        "From: {}\n",
        draft.merchant_name.as_deref().unwrap_or("-")
    ));
    text.push_str(&format!(
        "To: {} ({})\n\n",
        draft.customer_name.as_deref().unwrap_or("-"),
        draft
            .customer_msisdn
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));

    for item in items {
        text.push_str(&format!(
            "{} x{} @ {} = {}\n",
            item.name,
            item.quantity,
            item.unit_price,
            item.line_total()
        ));
    }

    text.push_str(&format!("\nSubtotal: {}\n", totals.subtotal));
    if draft.tax_elected.unwrap_or(false) {
        text.push_str(&format!("VAT (16% incl.): {}\n", totals.tax));
    }
    text.push_str(&format!("Total: {}\n", totals.total));
    text.push_str(&format!(
        "Due: {}\n",
        draft
            .due
            .as_ref()
            .map(|d| d.describe())
            .unwrap_or_else(|| "-".to_string())
    ));
    text.push_str(&format!(
        "Pay to: {}",
        draft
            .instrument()
            .map(|i| i.describe())
            .unwrap_or_else(|| "-".to_string())
    ));
    text
}
