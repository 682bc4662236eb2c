use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::commands::{CustomCommand, compile};
use crate::context::context_model::{Assembled, BidirectionalContext, PageState};
use crate::dom::document::Document;
use crate::screen::surveyor::{survey, survey_links};

/// Last-step hook that may inject or suppress anything before sending.
pub type ContextOverride = Arc<dyn Fn(Assembled) -> Assembled + Send + Sync>;

pub fn assemble(
    document: &Document,
    commands: &[CustomCommand],
    override_fn: Option<&ContextOverride>,
) -> Assembled {
    let fields = survey(document);
    let links = survey_links(document);

    let mut actions = Vec::with_capacity(commands.len());
    let mut custom_commands = HashMap::with_capacity(commands.len());
    for command in commands {
        match compile(command) {
            Ok((descriptor, handler)) => {
                actions.push(descriptor);
                custom_commands.insert(command.action.clone(), handler);
            }
            Err(e) => warn!(action = %command.action, error = %e, "dropping custom command"),
        }
    }

    let context = BidirectionalContext::new(
        &document.uri(),
        fields.fields,
        links.destination_names,
        actions,
    );
    debug!(
        fields = context.fields.len(),
        destinations = context.destinations.len(),
        actions = context.actions.len(),
        "assembled page context"
    );

    let assembled = Assembled {
        context,
        state: PageState {
            form_elements: fields.form_elements,
            links: links.links,
            custom_commands,
        },
    };

    let Some(apply) = override_fn else {
        return assembled;
    };

    // overrides may inject in any order; restore the canonical form
    let Assembled { context, state } = apply(assembled);
    Assembled {
        context: BidirectionalContext::new(
            &context.uri,
            context.fields,
            context.destinations,
            context.actions,
        ),
        state,
    }
}
