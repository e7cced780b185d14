//! Analysis agents
//!
//! One coordinator and five specialists. Specialists may call every tool;
//! the coordinator only synthesizes what the specialists produced.

pub mod crew;
pub mod llm;
pub mod tasks;

pub use crew::{Crew, CrewOutput, TaskOutput};
pub use llm::{create_llm_client, ChatMessage, ChatReply, FunctionSpec, LlmClient, ToolCallRequest};
pub use tasks::{TaskGraph, TaskSpec};

use crate::tools::ToolKind;

/// Guidance shared by every specialist on how to feed each tool
const TOOL_GUIDANCE: &str = "You have access to all API tools and must choose wisely:
- BigQuery Tool: population and demographic data. Construct SQL over bigquery-public-data datasets; \
use country_name with LIKE patterns, e.g. LOWER(country_name) LIKE '%united kingdom%'.
- REST Countries Tool: geographic and market size data. Always provide both 'country' and 'region' \
as strings (use '' when not needed).
- FRED Tool: macroeconomic indicators. Provide FRED series ids such as 'GDP', 'UNRATE', 'CPIAUCSL'.
- Alpha Vantage Tool: market conditions. Provide a stock symbol such as 'WMT', 'AMZN', 'HD', 'TGT', \
or leave it empty for general indicators.
- Fake Store Tool: product and pricing data. Provide a category name or leave it empty for all products.
Each tool requires specific input types. Read the project description carefully, decide which data you \
need, then call the right tool with the right parameters.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Coordinator,
    Operations,
    CustomerAnalytics,
    Financial,
    MarketIntelligence,
    ProductEcommerce,
}

impl AgentRole {
    pub const SPECIALISTS: [AgentRole; 5] = [
        AgentRole::Operations,
        AgentRole::CustomerAnalytics,
        AgentRole::Financial,
        AgentRole::MarketIntelligence,
        AgentRole::ProductEcommerce,
    ];

    /// Role name; also what the agent passes as `agent_name` to tools
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "Project Analysis Coordinator",
            AgentRole::Operations => "Operations & Supply Chain Analyst",
            AgentRole::CustomerAnalytics => "Customer Analytics & Marketing Specialist",
            AgentRole::Financial => "Financial & Sales Performance Analyst",
            AgentRole::MarketIntelligence => "Market Intelligence & Research Analyst",
            AgentRole::ProductEcommerce => "Product & E-commerce Specialist",
        }
    }

    /// Short area label used in prompts
    fn area(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "cross-functional",
            AgentRole::Operations => "operational and supply chain",
            AgentRole::CustomerAnalytics => "customer and marketing",
            AgentRole::Financial => "financial and sales",
            AgentRole::MarketIntelligence => "market intelligence and research",
            AgentRole::ProductEcommerce => "product and e-commerce",
        }
    }

    pub fn goal(&self) -> String {
        match self {
            AgentRole::Coordinator => "Coordinate specialized agents to provide comprehensive retail \
                project analysis by determining which areas are relevant, assigning tasks to appropriate \
                agents, and synthesizing results into a unified report"
                .to_string(),
            specialist => {
                let assessment = match specialist {
                    AgentRole::Operations => "operational feasibility and supply chain complexity",
                    AgentRole::CustomerAnalytics => "customer impact and marketing potential",
                    AgentRole::Financial => "financial viability and impact",
                    AgentRole::MarketIntelligence => "market viability and competitive impact",
                    _ => "product strategy and e-commerce impact",
                };
                format!(
                    "Intelligently analyze each retail project to determine what {} data is needed, \
                     then gather that data by providing the correct inputs to the appropriate API tools \
                     in the server, and finally analyze the retrieved data to assess {}",
                    specialist.area(),
                    assessment
                )
            }
        }
    }

    pub fn backstory(&self) -> String {
        let expertise = match self {
            AgentRole::Coordinator => {
                return "You are an experienced retail project analyst and coordinator with expertise \
                    across all retail domains. You understand retail project descriptions, determine which \
                    specialized areas of analysis are relevant (operations, customer analytics, financial, \
                    market intelligence, product), and synthesize the specialist analyses into one \
                    comprehensive report that demonstrates the project's usefulness and impact. You also \
                    simulate the impact on an example company to demonstrate real-world implications."
                    .to_string();
            }
            AgentRole::Operations => {
                "operations management and supply chain analysis. You understand how geography, \
                 logistics networks and regional complexity shape what a retail rollout costs to run"
            }
            AgentRole::CustomerAnalytics => {
                "customer analytics, marketing strategy and customer behavior analysis. You understand \
                 how demographics, geographic distribution and behavioral patterns impact retail projects"
            }
            AgentRole::Financial => {
                "retail finance and sales performance analysis. You understand how market conditions, \
                 macroeconomic indicators and pricing drive revenue, margins and return on investment"
            }
            AgentRole::MarketIntelligence => {
                "market research and competitive intelligence. You understand how macroeconomic trends, \
                 industry dynamics and market size determine whether a retail project can win"
            }
            AgentRole::ProductEcommerce => {
                "product strategy, assortment planning and e-commerce. You understand how catalog depth, \
                 price positioning and online channels shape a retail project's product success"
            }
        };
        format!(
            "You are an expert in {}.\n\nYour critical skill is to examine each project description and \
             determine exactly what {} data you need, then select the right API tool and provide the \
             correct input parameters to retrieve that data from the server.\n\n{}",
            expertise,
            self.area(),
            TOOL_GUIDANCE
        )
    }

    /// Tools this agent may call
    pub fn tools(&self) -> &'static [ToolKind] {
        match self {
            AgentRole::Coordinator => &[],
            _ => &ToolKind::ALL,
        }
    }

    /// System prompt for the agent loop
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}.\n{}\n\nYour personal goal is: {}",
            self.name(),
            self.backstory(),
            self.goal()
        )
    }
}
