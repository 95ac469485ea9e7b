//! User-facing response text.
//!
//! WhatsApp flavor: `*bold*`, bullet lists, no markdown tables. List
//! rendering numbers items 1..N per page — the same positions the
//! conversation context maps remember, so "the 3rd one" lines up.

use chrono::{DateTime, Local, Utc};
use quipu_core::entity::{Order, Task};

/// Terminal line for "next" with nothing to continue.
pub const NO_MORE_ITEMS: &str =
    "No more items to show. Please request your tasks or orders again.";

pub fn apology() -> String {
    "Sorry, something went wrong on my side. Please try again.".to_string()
}

pub fn action_apology(action: &str) -> String {
    format!("Sorry, I couldn't {action} right now. Please try again.")
}

pub fn help() -> String {
    "I can help with tasks and orders. Try:\n\
     • *remind me to call John tomorrow 5pm*\n\
     • *show my tasks*\n\
     • *order 2 bags of coffee for friday*\n\
     • *show my pending orders*\n\
     Or reply to a list I sent with a number to update or view an item."
        .to_string()
}

pub fn guidance() -> String {
    "I didn't catch what to do with that. Tell me what to create, show, or update — \
     for example *show my orders*."
        .to_string()
}

fn fmt_when(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%a %d %b, %H:%M").to_string()
}

fn status_tag(status: quipu_core::entity::EntityStatus) -> &'static str {
    status.as_str()
}

pub fn task_list(tasks: &[Task], offset: i64, total: i64, has_more: bool) -> String {
    if tasks.is_empty() {
        return no_tasks_yet();
    }
    let first = offset + 1;
    let last = offset + tasks.len() as i64;
    let mut out = format!("*Your tasks* ({first}–{last} of {total})\n");
    for (i, task) in tasks.iter().enumerate() {
        out.push_str(&format!("{}. {} [{}]", i + 1, task.title, status_tag(task.status)));
        if let Some(due) = task.due_at {
            out.push_str(&format!(" — due {}", fmt_when(due)));
        }
        out.push('\n');
    }
    out.push_str("\nReply with a number for details, or e.g. *mark 2 as done*.");
    if has_more {
        out.push_str("\nSend *next* for more.");
    }
    out
}

pub fn order_list(orders: &[Order], offset: i64, total: i64, has_more: bool) -> String {
    if orders.is_empty() {
        return "No orders found for that. Try *show my orders* without filters.".to_string();
    }
    let first = offset + 1;
    let last = offset + orders.len() as i64;
    let mut out = format!("*Your orders* ({first}–{last} of {total})\n");
    for (i, order) in orders.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} — {} × {} [{}]",
            i + 1,
            order.id,
            order.quantity,
            order.product,
            status_tag(order.status)
        ));
        if let Some(when) = order.fulfill_at {
            out.push_str(&format!(" — for {}", fmt_when(when)));
        }
        out.push('\n');
    }
    out.push_str("\nReply with a number for details, or e.g. *mark 1 and 3 as done*.");
    if has_more {
        out.push_str("\nSend *next* for more.");
    }
    out
}

pub fn task_detail(task: &Task) -> String {
    let mut out = format!("*{}*\nStatus: {}", task.title, status_tag(task.status));
    if let Some(ref desc) = task.description {
        out.push_str(&format!("\n{desc}"));
    }
    if let Some(due) = task.due_at {
        out.push_str(&format!("\nDue: {}", fmt_when(due)));
    }
    out.push_str(&format!("\nCreated: {}", fmt_when(task.created_at)));
    out
}

pub fn order_detail(order: &Order) -> String {
    let mut out = format!(
        "*Order {}*\n{} × {}\nStatus: {}",
        order.id,
        order.quantity,
        order.product,
        status_tag(order.status)
    );
    if let Some(when) = order.fulfill_at {
        out.push_str(&format!("\nFulfillment: {}", fmt_when(when)));
    }
    out.push_str(&format!("\nCreated: {}", fmt_when(order.created_at)));
    out
}

pub fn task_created(task: &Task) -> String {
    let mut out = format!("✅ Task created: *{}*", task.title);
    if let Some(due) = task.due_at {
        out.push_str(&format!(" — due {}", fmt_when(due)));
    }
    out
}

pub fn order_created(order: &Order) -> String {
    let mut out = format!(
        "🧾 Order *{}* created: {} × {}",
        order.id, order.quantity, order.product
    );
    if let Some(when) = order.fulfill_at {
        out.push_str(&format!(" — for {}", fmt_when(when)));
    }
    out
}

pub fn task_updated(task: &Task) -> String {
    format!(
        "✅ Task updated: *{}* is now *{}*.",
        task.title,
        status_tag(task.status)
    )
}

pub fn order_updated(order: &Order) -> String {
    format!(
        "✅ Order *{}* updated: {} × {}, now *{}*.",
        order.id,
        order.quantity,
        order.product,
        status_tag(order.status)
    )
}

/// Aggregate acknowledgement for batch updates: "Updated 2 orders."
pub fn bulk_updated(order_like: bool, count: u64) -> String {
    let noun = match (order_like, count) {
        (true, 1) => "order",
        (true, _) => "orders",
        (false, 1) => "task",
        (false, _) => "tasks",
    };
    format!("✅ Updated {count} {noun}.")
}

pub fn not_found(noun: &str) -> String {
    format!("I couldn't find that {noun}. It may have been removed.")
}

pub fn no_matching_task() -> String {
    "I couldn't find a matching task. Send *show my tasks* and reply with its number."
        .to_string()
}

pub fn which_one(noun: &str) -> String {
    format!("Which {noun} do you mean? Reply with its number from the list.")
}

pub fn nothing_to_change() -> String {
    "What would you like to change? You can set the status, title, description, or due date."
        .to_string()
}

pub fn ask_product() -> String {
    "What product should I put on the order?".to_string()
}

pub fn ask_order_id() -> String {
    "Which order should I update? Please include its ID (e.g. ORD-1A2B3C4D).".to_string()
}

pub fn no_tasks_yet() -> String {
    "You don't have any tasks yet. Send something like *remind me to call John tomorrow* \
     to create one."
        .to_string()
}

pub fn duplicate_order_question(existing: &Order) -> String {
    format!(
        "⚠️ That looks like a duplicate of order *{}* ({} × {}, {}).\n\
         Reply *new* to create a separate order, or *update* to change the existing one.",
        existing.id,
        existing.quantity,
        existing.product,
        status_tag(existing.status)
    )
}

pub fn duplicate_reprompt() -> String {
    "Please reply *new* to create a separate order, or *update* to change the existing one."
        .to_string()
}

pub fn duplicate_discarded() -> String {
    "Okay, I've kept the existing order unchanged.".to_string()
}

pub fn task_confirm_question(task: &Task, candidates: usize) -> String {
    let mut out = format!(
        "Did you mean *{}*? Reply *yes* to update it or *no* to leave it.",
        task.title
    );
    if candidates > 1 {
        out.push_str(&format!(
            "\n({candidates} tasks matched — this one fits best.)"
        ));
    }
    out
}

pub fn confirmation_expired() -> String {
    "That task is gone and the confirmation has expired. Please try again.".to_string()
}

pub fn update_cancelled() -> String {
    "Okay, no changes made.".to_string()
}
