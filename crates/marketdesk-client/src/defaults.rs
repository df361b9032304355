//! Built-in prompt templates, one per agent type.
//!
//! The orchestrator ships the same catalogue; the in-memory backend seeds itself
//! from here so offline sessions and tests see a realistic starting point.

use chrono::{DateTime, Duration, Utc};
use marketdesk_models::{AgentType, PromptTemplate};

/// Variables every analyst section receives.
const ANALYST_VARIABLES: &[&str] = &["company_name", "ticker", "market_type", "trade_date"];

/// Reports produced by the analyst stage, consumed by later stages.
const REPORT_VARIABLES: &[&str] = &[
    "market_report",
    "sentiment_report",
    "news_report",
    "fundamentals_report",
];

fn vars(groups: &[&[&str]]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|g| g.iter())
        .map(|v| v.to_string())
        .collect()
}

fn market_analyst() -> (String, Vec<String>) {
    (
        "You are a technical analyst working alongside other analysts.\n\n\
         Subject: {company_name} ({ticker}), {market_type} market, priced in \
         {currency_name} ({currency_symbol}), as of {trade_date}.\n\n\
         ## Required sections\n\
         1. Moving averages (MA5/10/20/60): alignment, crossovers, price position\n\
         2. MACD: DIF/DEA/histogram, crosses, divergence\n\
         3. RSI: overbought/oversold, divergence\n\
         4. Bollinger bands: band position, width trend, breakouts\n\
         5. Short-term (5-10 sessions) and medium-term (20-60 sessions) trend, volume\n\n\
         Close with a rating (buy/hold/sell), a target range and a stop level in \
         {currency_symbol}, and the main risks."
            .to_string(),
        vars(&[ANALYST_VARIABLES, &["currency_name", "currency_symbol"]]),
    )
}

fn fundamentals_analyst() -> (String, Vec<String>) {
    (
        "You are a fundamentals analyst covering {company_name} ({ticker}) in the \
         {market_type} market as of {trade_date}. Amounts are in {currency_name} \
         ({currency_symbol}).\n\n\
         Cover revenue and margin trends, balance-sheet strength, cash flow quality and \
         valuation (PE, PB, PEG against sector peers). Give a fair-value range in \
         {currency_symbol} and state which assumptions it is most sensitive to."
            .to_string(),
        vars(&[ANALYST_VARIABLES, &["currency_name", "currency_symbol"]]),
    )
}

fn news_analyst() -> (String, Vec<String>) {
    (
        "You are a news analyst. Review news about {company_name} ({ticker}, \
         {market_type} market) published up to {trade_date}.\n\n\
         For each material item give: timeliness (hours/days old), direction \
         (positive/negative/neutral), expected impact on price (high/medium/low) and \
         whether the market has already priced it in."
            .to_string(),
        vars(&[ANALYST_VARIABLES]),
    )
}

fn social_analyst() -> (String, Vec<String>) {
    (
        "You are a social media sentiment analyst for {company_name} ({ticker}, \
         {market_type} market) as of {trade_date}.\n\n\
         Report discussion volume versus its recent baseline, the dominant sentiment, \
         and any extreme-sentiment signals that historically precede reversals."
            .to_string(),
        vars(&[ANALYST_VARIABLES]),
    )
}

fn bull_researcher() -> (String, Vec<String>) {
    (
        "You are the bull researcher debating {company_name} ({ticker}, {market_type} \
         market, {currency_name} {currency_symbol}).\n\n\
         Market report: {market_report}\n\
         Sentiment report: {sentiment_report}\n\
         News report: {news_report}\n\
         Fundamentals report: {fundamentals_report}\n\n\
         Debate so far: {debate_history}\n\
         Last bear argument: {bear_response}\n\
         Lessons from similar situations: {past_memories}\n\n\
         Build the strongest evidence-based case for investing and rebut the bear \
         point by point, conversationally."
            .to_string(),
        vars(&[
            &["company_name", "ticker", "market_type", "currency_name", "currency_symbol"],
            REPORT_VARIABLES,
            &["debate_history", "bear_response", "past_memories"],
        ]),
    )
}

fn bear_researcher() -> (String, Vec<String>) {
    (
        "You are the bear researcher debating {company_name} ({ticker}, {market_type} \
         market, {currency_name} {currency_symbol}).\n\n\
         Market report: {market_report}\n\
         Sentiment report: {sentiment_report}\n\
         News report: {news_report}\n\
         Fundamentals report: {fundamentals_report}\n\n\
         Debate so far: {debate_history}\n\
         Last bull argument: {bull_response}\n\
         Lessons from similar situations: {past_memories}\n\n\
         Challenge the valuation and growth story, surface downside risks and rebut \
         the bull point by point, conversationally."
            .to_string(),
        vars(&[
            &["company_name", "ticker", "market_type", "currency_name", "currency_symbol"],
            REPORT_VARIABLES,
            &["debate_history", "bull_response", "past_memories"],
        ]),
    )
}

fn research_manager() -> (String, Vec<String>) {
    (
        "You are the research manager and debate facilitator.\n\n\
         Market report: {market_report}\n\
         Sentiment report: {sentiment_report}\n\
         News report: {news_report}\n\
         Fundamentals report: {fundamentals_report}\n\
         Bull/bear debate: {debate_history}\n\n\
         Decide buy, sell or hold. Commit to one side unless the evidence is genuinely \
         balanced, explain the decisive arguments and hand the trader a concrete \
         investment plan."
            .to_string(),
        vars(&[REPORT_VARIABLES, &["debate_history"]]),
    )
}

fn risk_debater(stance: &str, focus: &str, others: [&str; 2]) -> (String, Vec<String>) {
    let content = format!(
        "You are the {stance} risk analyst. {focus}\n\n\
         Trader's plan: {{trader_decision}}\n\
         Market report: {{market_report}}\n\
         Sentiment report: {{sentiment_report}}\n\
         News report: {{news_report}}\n\
         Fundamentals report: {{fundamentals_report}}\n\
         Risk debate so far: {{risk_history}}\n\
         Other analysts: {{{first}}} / {{{second}}}\n\n\
         Respond to the other analysts directly, conversationally, without special \
         formatting.",
        first = others[0],
        second = others[1],
    );
    (
        content,
        vars(&[
            &["trader_decision"],
            REPORT_VARIABLES,
            &["risk_history"],
            &others,
        ]),
    )
}

fn risk_manager() -> (String, Vec<String>) {
    (
        "You are the risk manager and judge of the risk debate.\n\n\
         Trader's plan: {trader_decision}\n\
         Aggressive view: {risky_response}\n\
         Conservative view: {safe_response}\n\
         Neutral view: {neutral_response}\n\
         Full debate: {risk_history}\n\n\
         Decide buy, sell or hold, assign a risk level (low/medium/high) and adjust the \
         trader's plan where the debate exposed weaknesses."
            .to_string(),
        vars(&[&[
            "trader_decision",
            "risky_response",
            "safe_response",
            "neutral_response",
            "risk_history",
        ]]),
    )
}

fn trader() -> (String, Vec<String>) {
    (
        "You are the trader for {company_name} ({market_type} market, priced in \
         {currency_name} {currency_symbol}).\n\n\
         Investment plan: {investment_plan}\n\
         Market report: {market_report}\n\
         Sentiment report: {sentiment_report}\n\
         News report: {news_report}\n\
         Fundamentals report: {fundamentals_report}\n\
         Lessons from past trades: {past_memories}\n\n\
         Give a concrete target price in {currency_symbol}; never answer that the \
         target cannot be determined. End with 'FINAL TRANSACTION PROPOSAL: \
         **BUY/HOLD/SELL**'."
            .to_string(),
        vars(&[
            &["company_name", "market_type", "currency_name", "currency_symbol"],
            &["investment_plan"],
            REPORT_VARIABLES,
            &["past_memories"],
        ]),
    )
}

/// Id, display name and description of each built-in template.
fn catalogue_entry(agent: AgentType) -> (&'static str, &'static str, &'static str) {
    match agent {
        AgentType::MarketAnalyst => (
            "default_market",
            "Default market analyst",
            "Technical analysis with a fixed output layout",
        ),
        AgentType::FundamentalsAnalyst => (
            "default_fundamentals",
            "Default fundamentals analyst",
            "Valuation analysis with a fair-value range",
        ),
        AgentType::NewsAnalyst => (
            "default_news",
            "Default news analyst",
            "News timeliness and impact assessment",
        ),
        AgentType::SocialAnalyst => (
            "default_social",
            "Default social media analyst",
            "Discussion volume and extreme-sentiment signals",
        ),
        AgentType::BullResearcher => (
            "default_bull",
            "Default bull researcher",
            "Conversational bull case with past lessons",
        ),
        AgentType::BearResearcher => (
            "default_bear",
            "Default bear researcher",
            "Risk-focused bear case challenging valuation",
        ),
        AgentType::ResearchManager => (
            "default_research_mgr",
            "Default research manager",
            "Judges the bull/bear debate and writes the plan",
        ),
        AgentType::RiskyDebater => (
            "default_risky",
            "Default aggressive risk analyst",
            "Argues for upside potential",
        ),
        AgentType::SafeDebater => (
            "default_safe",
            "Default conservative risk analyst",
            "Argues for capital protection",
        ),
        AgentType::NeutralDebater => (
            "default_neutral",
            "Default neutral risk analyst",
            "Argues for a balanced strategy",
        ),
        AgentType::RiskManager => (
            "default_risk_mgr",
            "Default risk manager",
            "Judges the risk debate and sets the risk level",
        ),
        AgentType::TraderAi => (
            "default_trader",
            "Default trader",
            "Trading decision with a mandatory target price",
        ),
    }
}

fn body(agent: AgentType) -> (String, Vec<String>) {
    match agent {
        AgentType::MarketAnalyst => market_analyst(),
        AgentType::FundamentalsAnalyst => fundamentals_analyst(),
        AgentType::NewsAnalyst => news_analyst(),
        AgentType::SocialAnalyst => social_analyst(),
        AgentType::BullResearcher => bull_researcher(),
        AgentType::BearResearcher => bear_researcher(),
        AgentType::ResearchManager => research_manager(),
        AgentType::RiskyDebater => risk_debater(
            "aggressive",
            "Champion high-reward opportunities and bold strategies.",
            ["safe_response", "neutral_response"],
        ),
        AgentType::SafeDebater => risk_debater(
            "conservative",
            "Protect capital, minimise volatility and favour steady growth.",
            ["risky_response", "neutral_response"],
        ),
        AgentType::NeutralDebater => risk_debater(
            "neutral",
            "Weigh both sides and propose a balanced, sustainable strategy.",
            ["risky_response", "safe_response"],
        ),
        AgentType::RiskManager => risk_manager(),
        AgentType::TraderAi => trader(),
    }
}

/// The built-in catalogue in agent declaration order.
///
/// Creation times are spaced one millisecond apart and end at `seeded_at`, so
/// the creation-time ordering matches the declaration order and anything
/// created afterwards sorts after the catalogue.
pub fn default_templates(seeded_at: DateTime<Utc>) -> Vec<PromptTemplate> {
    let last = AgentType::ALL.len() - 1;
    AgentType::ALL
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let (id, name, description) = catalogue_entry(*agent);
            let (content, variables) = body(*agent);
            let created_at = seeded_at - Duration::milliseconds((last - i) as i64);
            PromptTemplate {
                id: id.to_string(),
                name: name.to_string(),
                agent_type: *agent,
                content,
                variables,
                description: description.to_string(),
                is_default: true,
                created_at,
                updated_at: created_at,
            }
        })
        .collect()
}
