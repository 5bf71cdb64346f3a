//! 各阶段使用的提示词模板，占位符形如 `{name}`

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("static regex"));

/// 单遍替换占位符；未提供的占位符原样保留，替换值中的花括号不会被再次展开
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub const PLANNER_PROMPT: &str = r#"You are a strategic FDA data planner. Build a complete search plan for locating and extracting labeler codes across FDA.gov, driven by this request: {input}

The plan must cover:
- Search strategies aimed at the FDA.gov sections that publish labeler code information
- A consistent extraction format for documenting each labeler code
- How to recognise both long-standing and newly assigned labeler codes
- How to capture the full metadata attached to each code

### Search guidance
- Choose precise search terms that reach labeler code repositories, NDC directories and regulatory documents
- Cover public pages as well as the database sections of FDA.gov
- Include archives that hold historical labeler code assignments
- Explain how to connect labeler codes to registered establishments and companies

### Data to capture
- For each labeler code: numeric value, company name, status (active/inactive)
- Metadata: initial registration date, last verification date, recorded modifications
- Any ZIP files, downloadable databases or regulatory filings that accompany the codes
- A standard recording format suitable for loading into a database

### Response format
Respond with a single JSON object and nothing else:
```json
{
    "primary_search_terms": ["term1", "term2", "term3"],
    "search_strategy": "Multi-stage search approach",
    "target_locations": ["FDA.gov sections to visit first"],
    "data_extraction_format": "Format specification for recording codes",
    "verification_process": "How identified codes are validated",
    "metadata_requirements": ["Metadata fields required for each code"]
}
```
"#;

pub const RESEARCH_PROMPT: &str = r#"You are an FDA regulatory data specialist. Your job is to locate, document and validate labeler codes on FDA.gov together with their metadata, following the research plan below.

### Research plan
- Primary search terms: {primary_search_terms}
- Search strategy: {search_strategy}
- Target locations: {target_locations}
- Data extraction format: {data_extraction_format}
- Verification process: {verification_process}
- Required metadata: {metadata_requirements}
{feedback}
### Available tools
{tools}

### How to work
1. Start with the primary search terms on FDA.gov domains
2. Visit the target locations named in the plan
3. Follow the search strategy stage by stage
4. Record data in the requested extraction format
5. Validate every code with the verification process
6. Capture every required metadata field for each code
7. Stop after identifying 5 distinct labeler codes or once a clear conclusion is reached
8. Look for csv, zip, txt, excel or other data file links on the pages you visit
9. Include downloadable resources in the final answer as "file_url" and "file_name" fields

### Tool input
Always pass {tool_names} a JSON object, for example:
{"url": "https://www.fda.gov", "action": "navigate"}
{"url": "https://www.fda.gov", "action": "search", "search_term": "labeler code"}
{"url": "https://www.fda.gov/drugs/drug-approvals-and-databases/national-drug-code-directory", "action": "find_links", "file_type": "zip"}
{"url": "https://www.accessdata.fda.gov/scripts/cder/ndc/", "action": "extract_table", "table_selector": "table"}
{"url": "https://www.fda.gov/example/file.csv", "action": "download_file"}

### Format
Question: the research request
Thought: what you are going to do next and why
Action: the tool to use, one of [{tool_names}]
Action Input: the JSON object for the tool
Observation: the tool result
... (Thought/Action/Action Input/Observation can repeat)
Thought: I now have the labeler codes
Final Answer: a JSON array with one object per labeler code, for example [{"labeler_code": "00002", "company_name": "...", "status": "...", "file_url": "...", "file_name": "..."}]

Begin!

Question: {input}
"#;

/// 回到Researcher时附加在研究计划后的分析师反馈
pub const FEEDBACK_SECTION: &str = r#"
### Analyst feedback on the previous findings
{feedback}
"#;

pub const REVIEWER_PROMPT: &str = r#"**Role**: Labeler code data consolidator

**Objective**: Consolidate the records below into one consistent report.

**Records**
{list}

**For each labeler code extract**
  a. Labeler Code (numeric value)
  b. Company Name
  c. Status (Active/Inactive)
  d. Initial Registration Date
  e. Last Verification Date
  f. Modification History (if any)
  g. Source URL (FDA.gov page)
  h. Source File (if applicable)
  i. NDC Product Codes associated with the labeler code
  j. Drug Establishment Identifier (FEI number, if available)

**Output format**
Plain text. Format every labeler code as follows and separate entries with a blank line:

Labeler Code: [Numeric Value]
Company Name: [Company Name]
Status: [Active/Inactive]
Initial Registration Date: [YYYY-MM-DD]
Last Verification Date: [YYYY-MM-DD]
Modification History: [List of changes with dates]
Source URL: [FDA.gov URL]
Source File: [Filename if applicable]
NDC Product Codes: [List of associated codes]
FEI Number: [Drug Establishment Identifier if available]

If the record list is empty, state that no labeler codes were found.
"#;

/// 带工具的复核模式：允许回到页面补全缺失字段
pub const REVIEWER_AGENT_PROMPT: &str = r#"**Role**: Labeler code data consolidator with web access

**Objective**: Complete and consolidate the records below. Use the tool to revisit a source page only when a field is missing or needs confirmation.

**Records**
{list}

### Available tools
{tools}

Format each labeler code as "Labeler Code", "Company Name", "Status", "Initial Registration Date", "Last Verification Date", "Modification History", "Source URL", "Source File", "NDC Product Codes" and "FEI Number" lines, one entry per code separated by a blank line.

### Format
Question: the review request
Thought: what you are going to do next
Action: the tool to use, one of [{tool_names}]
Action Input: the JSON object for the tool
Observation: the tool result
... (Thought/Action/Action Input/Observation can repeat)
Final Answer: the consolidated plain-text report

Begin!

Question: {input}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_pass() {
        let rendered = render(
            "Q: {input} / {tools} / {missing}",
            &[("input", "{tools}"), ("tools", "browser")],
        );
        assert_eq!(rendered, "Q: {tools} / browser / {missing}");
    }

    #[test]
    fn test_json_examples_survive_rendering() {
        let rendered = render(RESEARCH_PROMPT, &[("input", "Labeler code 00002")]);
        assert!(rendered.contains(r#"{"url": "https://www.fda.gov", "action": "navigate"}"#));
        assert!(rendered.contains("Question: Labeler code 00002"));
    }

    #[test]
    fn test_planner_prompt_has_input() {
        let rendered = render(PLANNER_PROMPT, &[("input", "Labeler code 00002")]);
        assert!(rendered.contains("request: Labeler code 00002"));
        assert!(rendered.contains("\"metadata_requirements\""));
    }
}
