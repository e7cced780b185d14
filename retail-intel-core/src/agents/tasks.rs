//! Task graph for one analysis run

use super::AgentRole;
use crate::error::{Error, Result};

const TOOL_DISCIPLINE: &str = "IMPORTANT:
- You MUST use at least ONE tool to gather data before providing your analysis.
- Call each tool SEPARATELY, one at a time, and wait for each response before calling the next.
- When calling tools, pass your role name in the agent_name parameter.";

const REPORT_DISCIPLINE: &str = "You must provide a FULL, DETAILED report (at least 300-500 words) \
with specific data points, metrics and insights from the tool data you gather. Do NOT provide just a \
summary. Format your analysis as a clear, structured report with sections and subsections.";

/// One unit of work assigned to an agent
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    /// Short identifier, e.g. `operations`
    pub name: &'static str,
    pub agent: AgentRole,
    pub description: String,
    pub expected_output: &'static str,
    /// Indices of tasks whose outputs this task reads
    pub context: Vec<usize>,
}

impl TaskSpec {
    pub fn is_leaf(&self) -> bool {
        self.context.is_empty()
    }
}

/// Tasks in declaration order with their dependencies
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<TaskSpec>,
}

impl TaskGraph {
    pub fn new(tasks: Vec<TaskSpec>) -> Self {
        Self { tasks }
    }

    /// Five specialist tasks plus the coordinator's synthesis over all of them
    pub fn for_project(project_description: &str) -> Self {
        let mut tasks: Vec<TaskSpec> = AgentRole::SPECIALISTS
            .iter()
            .map(|&role| specialist_task(role, project_description))
            .collect();

        let context = (0..tasks.len()).collect();
        tasks.push(TaskSpec {
            name: "synthesis",
            agent: AgentRole::Coordinator,
            description: synthesis_description(project_description),
            expected_output: "A comprehensive retail project analysis report combining all specialized areas",
            context,
        });

        Self { tasks }
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Indices of tasks with no dependencies
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.tasks.len())
            .filter(|&i| self.tasks[i].is_leaf())
            .collect()
    }

    /// Indices of tasks that depend on others
    pub fn dependents(&self) -> Vec<usize> {
        (0..self.tasks.len())
            .filter(|&i| !self.tasks[i].is_leaf())
            .collect()
    }

    /// Check the graph can run as leaves-then-dependents.
    ///
    /// Every dependent must read only leaves, and at least one dependent
    /// must read every leaf.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(Error::TaskGraph("no tasks".to_string()));
        }

        let leaves = self.leaves();
        let dependents = self.dependents();

        for &i in &dependents {
            let task = &self.tasks[i];
            for &dep in &task.context {
                if dep >= self.tasks.len() {
                    return Err(Error::TaskGraph(format!(
                        "task '{}' depends on missing task #{}",
                        task.name, dep
                    )));
                }
                if !self.tasks[dep].is_leaf() {
                    return Err(Error::TaskGraph(format!(
                        "task '{}' depends on non-leaf task '{}'",
                        task.name, self.tasks[dep].name
                    )));
                }
            }
        }

        if !dependents.is_empty() {
            let covered = |leaf: &usize| {
                dependents
                    .iter()
                    .any(|&d| self.tasks[d].context.contains(leaf))
            };
            if let Some(&orphan) = leaves.iter().find(|&&leaf| !covered(&leaf)) {
                return Err(Error::TaskGraph(format!(
                    "output of task '{}' is never synthesized",
                    self.tasks[orphan].name
                )));
            }
        }

        Ok(())
    }
}

fn specialist_task(role: AgentRole, project_description: &str) -> TaskSpec {
    let (name, heading, deliverables, expected_output) = match role {
        AgentRole::Operations => (
            "operations",
            "operations and supply chain",
            "- Operational feasibility assessment with specific metrics and data points
- Supply chain complexity analysis with regional breakdowns
- Location-specific operational considerations with concrete examples
- Impact on operations and supply chain with quantitative insights",
            "A comprehensive, detailed operations and supply chain analysis report (300-500+ words) with specific data points and metrics",
        ),
        AgentRole::CustomerAnalytics => (
            "customer_analytics",
            "customer analytics and marketing",
            "- Customer segmentation and demographics with specific population data and percentages
- Marketing potential and effectiveness with market size metrics
- Customer impact and engagement opportunities with actionable strategies
- Geographic customer distribution with regional breakdowns",
            "A comprehensive, detailed customer analytics and marketing analysis report (300-500+ words) with specific data points and metrics",
        ),
        AgentRole::Financial => (
            "financial",
            "financial and sales performance",
            "- Financial viability and profitability with specific calculations and projections
- Sales performance projections with revenue forecasts and growth estimates
- Financial impact and ROI potential with quantitative analysis
- Market conditions affecting financial performance with economic indicators",
            "A comprehensive, detailed financial and sales performance analysis report (300-500+ words) with specific calculations and metrics",
        ),
        AgentRole::MarketIntelligence => (
            "market_intelligence",
            "market intelligence and research",
            "- Market trends and industry dynamics with specific economic indicators and data
- Competitive positioning with market share insights and differentiation strategies
- Market viability and opportunities with quantitative market size analysis
- Long-term macroeconomic factors with GDP, unemployment and inflation data",
            "A comprehensive, detailed market intelligence and research analysis report (300-500+ words) with specific data points and metrics",
        ),
        AgentRole::ProductEcommerce | AgentRole::Coordinator => (
            "product_ecommerce",
            "product and e-commerce",
            "- Product strategy and assortment planning with specific product categories and pricing data
- E-commerce performance potential with conversion metrics and online sales projections
- Pricing strategies with price distribution analysis and competitive positioning
- Omnichannel integration opportunities with specific implementation recommendations",
            "A comprehensive, detailed product and e-commerce analysis report (300-500+ words) with specific data points and metrics",
        ),
    };

    let description = format!(
        "Analyze the {heading} aspects of this retail project:\n{project}\n\n{discipline}\n\n\
         Then provide a DETAILED, COMPREHENSIVE analysis report that includes:\n{deliverables}\n\n\
         Your role name for the agent_name parameter is \"{role}\".\n{report}",
        heading = heading,
        project = project_description,
        discipline = TOOL_DISCIPLINE,
        deliverables = deliverables,
        role = role.name(),
        report = REPORT_DISCIPLINE,
    );

    TaskSpec {
        name,
        agent: role,
        description,
        expected_output,
        context: Vec::new(),
    }
}

fn synthesis_description(project_description: &str) -> String {
    let sources: Vec<String> = AgentRole::SPECIALISTS
        .iter()
        .map(|role| format!("- the analysis from the {}", role.name()))
        .collect();
    format!(
        "You are coordinating the analysis of this retail project:\n{}\n\n\
         Review the analyses provided by the specialist agents:\n{}\n\n\
         Synthesize all these analyses into one comprehensive report that:\n\
         1. Summarizes the project's usefulness and impact across all relevant areas\n\
         2. Highlights key insights from each specialized area\n\
         3. Identifies synergies and cross-area considerations\n\
         4. Simulates the impact on an example retail company\n\
         5. Provides actionable recommendations\n\n\
         Format the final report clearly with sections for each area and an overall summary.",
        project_description,
        sources.join("\n")
    )
}
