use chrono::{Duration, Utc};
use serde_json::json;
use thiserror::Error;

use crate::db::store::{ConceptDraft, TaskDraft, TaskHint, TaskTest};
use crate::db::{StoreError, TaskCatalog};
use crate::services::concepts::{ConceptResolver, ResolveError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("concept {name}: {source}")]
    Concept {
        name: &'static str,
        #[source]
        source: ResolveError,
    },
    #[error("task {id}: {source}")]
    Task {
        id: &'static str,
        #[source]
        source: StoreError,
    },
}

struct SeedConcept {
    name: &'static str,
    description: &'static str,
    difficulty: i32,
    prerequisites: &'static [&'static str],
}

const SEED_CONCEPTS: &[SeedConcept] = &[
    SeedConcept {
        name: "html-basics",
        description: "Basic HTML structure and elements",
        difficulty: 1,
        prerequisites: &[],
    },
    SeedConcept {
        name: "css-styling",
        description: "CSS styling and layout basics",
        difficulty: 2,
        prerequisites: &["html-basics"],
    },
    SeedConcept {
        name: "javascript-basics",
        description: "JavaScript fundamentals",
        difficulty: 2,
        prerequisites: &["html-basics"],
    },
];

struct SeedTask {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    prompt: &'static str,
    difficulty: i32,
    concepts: &'static [&'static str],
    file: &'static str,
    /// `(id, code, description)`
    tests: &'static [(&'static str, &'static str, &'static str)],
    hints: &'static [&'static str],
}

const PAGE_SHELL: &str = "<!DOCTYPE html>\n<html>\n  <head>\n    <title>My Page</title>\n  </head>\n  <body>\n    <!-- Add your code here -->\n  </body>\n</html>";

const SEED_TASKS: &[SeedTask] = &[
    SeedTask {
        id: "html-basics-1",
        title: "Create Your First Webpage",
        description: "Learn to create a basic HTML page with a heading and paragraph",
        prompt: "Create a simple webpage with:\n- A main heading (h1) that says \"Hello World\"\n- A paragraph that introduces yourself",
        difficulty: 1,
        concepts: &["html-basics"],
        file: PAGE_SHELL,
        tests: &[
            ("has-h1", "document.querySelector('h1') !== null", "Page should have an h1 heading"),
            ("has-paragraph", "document.querySelector('p') !== null", "Page should have a paragraph"),
        ],
        hints: &[
            "Use the <h1> tag for the main heading",
            "Use the <p> tag for the paragraph. Place both inside the <body> tag",
            "Add <h1>Hello World</h1> and <p>Your introduction here</p> inside the body",
        ],
    },
    SeedTask {
        id: "html-basics-2",
        title: "Add a Button",
        description: "Learn to add interactive buttons to your page",
        prompt: "Add a button to your webpage that says \"Click Me!\"",
        difficulty: 1,
        concepts: &["html-basics"],
        file: "<!DOCTYPE html>\n<html>\n  <head>\n    <title>My Page</title>\n  </head>\n  <body>\n    <h1>Hello World</h1>\n    <!-- Add button here -->\n  </body>\n</html>",
        tests: &[
            ("has-button", "document.querySelector('button') !== null", "Page should have a button element"),
            ("button-text", "document.querySelector('button')?.textContent.includes('Click')", "Button should contain the word \"Click\""),
        ],
        hints: &[
            "Use the <button> tag to create a button",
            "Put the button text between opening and closing button tags",
            "Add <button>Click Me!</button> after the h1 tag",
        ],
    },
    SeedTask {
        id: "css-basics-1",
        title: "Style Your Heading",
        description: "Use CSS to change the color of your heading",
        prompt: "Make the heading blue using CSS",
        difficulty: 2,
        concepts: &["css-styling"],
        file: "<!DOCTYPE html>\n<html>\n  <head>\n    <title>My Page</title>\n    <style>\n      /* Add your CSS here */\n    </style>\n  </head>\n  <body>\n    <h1>Hello World</h1>\n  </body>\n</html>",
        tests: &[(
            "h1-has-style",
            "window.getComputedStyle(document.querySelector('h1')).color !== 'rgb(0, 0, 0)'",
            "H1 should have a color style applied",
        )],
        hints: &[
            "Write CSS inside the <style> tag in the <head>",
            "Target h1 elements with \"h1 { }\" and add the color property",
            "Add \"h1 { color: blue; }\" inside the style tag",
        ],
    },
    SeedTask {
        id: "js-basics-1",
        title: "Make the Button Count Clicks",
        description: "Use JavaScript to react to button clicks",
        prompt: "Add a button and a span with id \"count\". Each click on the button should increase the number shown in the span by one.",
        difficulty: 3,
        concepts: &["javascript-basics", "html-basics"],
        file: "<!DOCTYPE html>\n<html>\n  <head>\n    <title>Counter</title>\n  </head>\n  <body>\n    <button>Click Me!</button>\n    <span id=\"count\">0</span>\n    <script>\n      // Add your code here\n    </script>\n  </body>\n</html>",
        tests: &[
            ("has-count", "document.getElementById('count') !== null", "Page should have a span with id count"),
            ("click-increments", "(() => { const b = document.querySelector('button'); const c = document.getElementById('count'); const before = Number(c.textContent); b.click(); return Number(c.textContent) === before + 1; })()", "Clicking the button should increase the count"),
        ],
        hints: &[
            "Select the button with document.querySelector and listen for 'click'",
            "Read the current number with Number(span.textContent)",
            "Inside the listener, set span.textContent to the old number plus one",
        ],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub concepts: usize,
    pub tasks: usize,
}

/// Loads the built-in demo catalog. Safe to run repeatedly: concepts are
/// find-or-create and tasks are upserted by id.
pub async fn seed_demo_catalog(
    resolver: &ConceptResolver,
    catalog: &dyn TaskCatalog,
) -> Result<SeedSummary, SeedError> {
    for concept in SEED_CONCEPTS {
        let draft = ConceptDraft {
            name: concept.name.to_string(),
            description: concept.description.to_string(),
            difficulty: concept.difficulty,
            prerequisites: concept.prerequisites.iter().map(|p| p.to_string()).collect(),
        };
        resolver
            .resolve_draft(&draft)
            .await
            .map_err(|source| SeedError::Concept {
                name: concept.name,
                source,
            })?;
    }

    let base = Utc::now();
    for (order, task) in SEED_TASKS.iter().enumerate() {
        let mut concept_ids = Vec::with_capacity(task.concepts.len());
        for &name in task.concepts {
            let concept = resolver
                .resolve(name)
                .await
                .map_err(|source| SeedError::Concept { name, source })?;
            concept_ids.push(concept.id);
        }

        let draft = task_draft(task, base + Duration::seconds(order as i64));
        catalog
            .upsert_task(&draft, &concept_ids)
            .await
            .map_err(|source| SeedError::Task {
                id: task.id,
                source,
            })?;
    }

    let summary = SeedSummary {
        concepts: SEED_CONCEPTS.len(),
        tasks: SEED_TASKS.len(),
    };
    tracing::info!(concepts = summary.concepts, tasks = summary.tasks, "demo catalog seeded");
    Ok(summary)
}

fn task_draft(task: &SeedTask, created_at: chrono::DateTime<Utc>) -> TaskDraft {
    let primary_concept = task.concepts.first().map(|c| c.to_string());
    TaskDraft {
        id: task.id.to_string(),
        title: task.title.to_string(),
        description: Some(task.description.to_string()),
        prompt: task.prompt.to_string(),
        difficulty: task.difficulty,
        scaffold: json!({ "index.html": task.file }),
        tests: task
            .tests
            .iter()
            .map(|(id, code, description)| TaskTest {
                id: id.to_string(),
                code: code.to_string(),
                description: Some(description.to_string()),
            })
            .collect(),
        hints: task
            .hints
            .iter()
            .enumerate()
            .map(|(i, text)| TaskHint {
                level: i as i32 + 1,
                text: text.to_string(),
                concept_tag: primary_concept.clone(),
            })
            .collect(),
        created_at,
    }
}
