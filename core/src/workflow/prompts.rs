//! Prompt text for every model-facing stage

use super::state::Intent;

pub const FIGURE_BACKGROUND: &str = "#000000";
pub const AXES_BACKGROUND: &str = "#111111";
pub const ACCENT: &str = "#FC5200";
pub const TEXT_COLOR: &str = "#ffffff";
pub const TICK_COLOR: &str = "#aaaaaa";
pub const GRID_COLOR: &str = "#333333";

/// Shared inputs to the generation and judgment prompts
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub query: &'a str,
    /// Column-by-column description of the dataset
    pub overview: &'a str,
    /// Markdown table of the first rows
    pub sample: &'a str,
}

/* ===================== Routing ===================== */

pub fn classify(query: &str) -> String {
    format!(
        "You are a data analysis expert. Decide whether the user query asks for a chart or for data analysis.\n\
         Assume the user wants data unless they explicitly ask for a chart, graph, plot or any other visualization.\n\
         User query: {query}\n\
         Return only the word \"chart\" or \"data\"."
    )
}

/// Lexical guess at the next step, shown to the enhancer only
pub fn lexical_intent(query: &str) -> Intent {
    if query.to_lowercase().contains("chart") {
        Intent::Chart
    } else {
        Intent::Data
    }
}

pub fn enhance(query: &str, overview: &str) -> String {
    let next_step = match lexical_intent(query) {
        Intent::Chart => "generate a chart",
        Intent::Data => "analyze the data",
    };
    format!(
        "User query: {query}\n\n\
         {overview}\n\n\
         You are a data analysis expert. Rewrite the user query so it is specific and unambiguous.\n\
         The next step of this workflow will {next_step} by writing pandas or seaborn code.\n\
         Add the details that step needs: which columns to use, which filters and aggregations to apply, \
         what the x-axis and y-axis should be when plotting.\n\n\
         Return only the rewritten query. Be concise, not conversational."
    )
}

/* ===================== Generation ===================== */

fn theme_rules() -> String {
    format!(
        "- Apply a dark theme:\n\
         \x20 * plt.style.use('dark_background') before plotting\n\
         \x20 * figure background {FIGURE_BACKGROUND}\n\
         \x20 * axes background {AXES_BACKGROUND}\n\
         \x20 * {ACCENT} as the primary color for the data\n\
         \x20 * {TEXT_COLOR} for titles, labels and legend text\n\
         \x20 * {TICK_COLOR} for tick labels\n\
         \x20 * {GRID_COLOR} for grid lines and spines"
    )
}

fn chart_rules() -> String {
    format!(
        "Requirements:\n\
         - Use seaborn and matplotlib.pyplot; pandas and numpy may be used to prepare the data\n\
         - Refer to the dataset as df; it is already loaded\n\
         - Save the chart with plt.savefig('chart.png', dpi=300, bbox_inches='tight')\n\
         - Call plt.clf() after saving\n\
         {}\n\
         - Give the chart a title and axis labels, and a legend when there are several series\n\
         - Zero or missing values are common (heart rate in particular); handle them",
        theme_rules()
    )
}

const DATA_RULES: &str = "Requirements:\n\
    - Do not plot anything\n\
    - Refer to the dataset as df; it is already loaded\n\
    - Print the answer with print(...)\n\
    - Answer the question directly; include the id of an activity when the question is about specific activities\n\
    - Treat zero and missing values as unrecorded\n\
    - Check that a selection is not empty (.empty or .shape[0]) before idxmax(), idxmin() or similar calls\n\
    - If nothing matches the query, print \"No data found\"";

pub fn generate(intent: Intent, ctx: PromptContext<'_>) -> String {
    let PromptContext {
        query,
        overview,
        sample,
    } = ctx;
    match intent {
        Intent::Chart => format!(
            "You are a data analysis expert. Write seaborn Python code that draws a chart answering the user query.\n\n\
             {overview}\n\n\
             First rows of the dataset:\n{sample}\n\n\
             User query: {query}\n\n\
             {rules}\n\n\
             RETURN ONLY THE CODE.",
            rules = chart_rules()
        ),
        Intent::Data => format!(
            "You are a data analysis expert. Write pandas Python code that answers the user query.\n\n\
             {overview}\n\n\
             First rows of the dataset:\n{sample}\n\n\
             User query: {query}\n\n\
             {DATA_RULES}\n\n\
             RETURN ONLY THE CODE. DO NOT GENERATE ANY GRAPHS."
        ),
    }
}

/* ===================== Verification ===================== */

pub fn judge(intent: Intent, ctx: PromptContext<'_>, code: &str) -> String {
    let PromptContext { query, sample, .. } = ctx;
    let (kind, extra) = match intent {
        Intent::Chart => ("seaborn chart", ""),
        Intent::Data => ("pandas analysis", " Make sure the code does not draw any chart."),
    };
    format!(
        "You are a data analysis expert reviewing generated {kind} code.\n\n\
         First rows of the dataset:\n{sample}\n\n\
         User query: {query}\n\n\
         Generated code:\n{code}\n\n\
         Check that the code is syntactically valid and faithful to the user query.{extra} \
         If it is, return only the word \"valid\". Otherwise explain what is wrong."
    )
}

pub fn correct(intent: Intent, ctx: PromptContext<'_>, code: &str, feedback: &str) -> String {
    let PromptContext {
        query, overview, ..
    } = ctx;
    let rules = match intent {
        Intent::Chart => chart_rules(),
        Intent::Data => DATA_RULES.to_string(),
    };
    format!(
        "You are a data analysis expert. Improve the generated code using the reviewer feedback, \
         only where necessary; otherwise return the code unchanged.\n\n\
         {overview}\n\n\
         User query: {query}\n\n\
         Generated code:\n{code}\n\n\
         Feedback: {feedback}\n\n\
         {rules}\n\n\
         RETURN ONLY THE CODE."
    )
}

/* ===================== Synthesis ===================== */

pub fn synthesize(query: &str, overview: &str, has_text: bool, has_chart: bool, link_pattern: &str) -> String {
    let example = link_pattern.replace("{id}", "<ID>");
    format!(
        "{overview}\n\n\
         You write the final answer to a user query about their running history, based on an analysis \
         that has already run.\n\
         Respond in Markdown. Be concise and to the point, not conversational.\n\
         If an activity id is part of the answer, link to it like this: {example}\n\
         Text output exists: {text}\n\
         Chart output exists: {chart}\n\
         User query: {query}",
        text = py_bool(has_text),
        chart = py_bool(has_chart),
    )
}

/// Answer used when the synthesis call fails
pub fn apology(has_text: bool, has_chart: bool) -> String {
    let mut text = String::from("Sorry, I couldn't write a summary for this question.");
    if has_chart {
        text.push_str(" The chart that was generated is attached.");
    }
    if has_text {
        text.push_str(" The raw analysis output is included below.");
    }
    if !has_chart && !has_text {
        text.push_str(" The analysis did not produce any output; please try rephrasing the question.");
    }
    text
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PromptContext<'static> {
        PromptContext {
            query: "Plot weekly mileage",
            overview: "OVERVIEW",
            sample: "| id |",
        }
    }

    #[test]
    fn test_lexical_hint_does_not_depend_on_case() {
        assert_eq!(lexical_intent("Show me a CHART"), Intent::Chart);
        assert_eq!(lexical_intent("plot my runs"), Intent::Data);
        assert!(enhance("make a chart", "O").contains("generate a chart"));
        assert!(enhance("longest run", "O").contains("analyze the data"));
    }

    #[test]
    fn test_chart_prompt_carries_theme() {
        let prompt = generate(Intent::Chart, ctx());
        for color in [FIGURE_BACKGROUND, AXES_BACKGROUND, ACCENT, TEXT_COLOR, TICK_COLOR, GRID_COLOR] {
            assert!(prompt.contains(color), "missing {}", color);
        }
        assert!(prompt.contains("plt.savefig('chart.png'"));
        assert!(prompt.contains("| id |"));
    }

    #[test]
    fn test_data_prompt_rules() {
        let prompt = generate(Intent::Data, ctx());
        assert!(prompt.contains("No data found"));
        assert!(prompt.contains("idxmax()"));
        assert!(!prompt.contains(ACCENT));
    }

    #[test]
    fn test_judge_and_correct_embed_code() {
        let judge = judge(Intent::Data, ctx(), "print(1)");
        assert!(judge.contains("print(1)"));
        assert!(judge.contains("\"valid\""));
        let fix = correct(Intent::Chart, ctx(), "plt.plot()", "no title");
        assert!(fix.contains("Feedback: no title"));
        assert!(fix.contains("plt.clf()"));
    }

    #[test]
    fn test_synthesis_flags_and_link() {
        let prompt = synthesize(
            "longest run?",
            "O",
            true,
            false,
            "https://www.strava.com/activities/{id}",
        );
        assert!(prompt.contains("Text output exists: True"));
        assert!(prompt.contains("Chart output exists: False"));
        assert!(prompt.contains("https://www.strava.com/activities/<ID>"));
    }

    #[test]
    fn test_apology_reflects_flags() {
        assert!(apology(false, true).contains("chart"));
        assert!(apology(true, false).contains("output is included"));
        assert!(apology(false, false).contains("did not produce any output"));
    }
}
