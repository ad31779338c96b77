//! Markdown report assembly.

use crate::analysis::PostAnalyses;
use crate::error::ReportError;
use crate::firewall::{AuditStatus, VerificationPayload, VerificationResult};
use crate::intent::Intent;
use crate::types::Mode;
use std::fmt::Write;

/// Domain terms explained when `explain_terms` is on.
const GLOSSARY: [(&str, &str); 12] = [
    ("ROI", "投资回报率，年收益与总投入之比"),
    ("IRR", "内部收益率，使项目净现值为零的折现率"),
    ("EPC", "工程总承包，设计、采购、施工一体化交付"),
    ("光伏", "利用太阳能电池把光能直接转换为电能的发电方式"),
    ("并网", "发电设备接入公共电网并向电网送电"),
    ("现金流", "一段时间内实际流入与流出的资金"),
    ("毛利率", "（收入−直接成本）÷ 收入"),
    ("回本周期", "累计净收益覆盖初始投入所需的时间"),
    ("补贴", "政府对特定行业或项目给予的资金支持"),
    ("净现值", "未来现金流按折现率折算到今天的价值减去初始投入"),
    ("杠杆", "借入资金放大投入规模，同时放大收益与风险"),
    ("盈亏平衡", "收入恰好覆盖全部成本、利润为零的经营水平"),
];

pub struct ReportInput<'a> {
    pub mode: Mode,
    pub intent: &'a Intent,
    pub raw_input: &'a str,
    pub aggregated: &'a str,
    pub verification: &'a [VerificationResult],
    pub analyses: &'a PostAnalyses,
    pub explain_terms: bool,
}

fn mode_banner(mode: Mode) -> &'static str {
    match mode {
        Mode::Forward => "正向（从现有资源出发寻找方向）",
        Mode::Reverse => "逆向（评估目标项目的可行性）",
        Mode::Mixed => "混合（正向与逆向综合）",
    }
}

fn verification_row(result: &VerificationResult) -> String {
    let verdict = if result.passed { "通过" } else { "未通过" };
    let (name, note) = match &result.payload {
        VerificationPayload::Search { result_count, .. } => {
            ("检索预填", format!("命中 {result_count} 条资料"))
        }
        VerificationPayload::Triangulation {
            verified,
            confidence,
            sources,
        } => (
            "三角验证",
            format!(
                "{}，置信度 {confidence}，来源 {} 个",
                if *verified { "已印证" } else { "未印证" },
                sources.len()
            ),
        ),
        VerificationPayload::DualModel {
            consistent_count,
            total,
            ..
        } => ("双模型互审", format!("{consistent_count}/{total} 个角色结论一致")),
        VerificationPayload::Correction { records } => {
            let count: usize = records.iter().map(|r| r.corrections.len()).sum();
            ("实时纠错", format!("{} 个角色共修正 {count} 处", records.len()))
        }
        VerificationPayload::Audit { audit, status } => match (audit, status) {
            (Some(audit), _) => (
                "事后审计",
                format!("{} 分（{}）{}", audit.overall_score, audit.overall_grade, audit.summary),
            ),
            (None, AuditStatus::Unavailable) => ("事后审计", "审计不可用，按中性处理".to_string()),
            (None, AuditStatus::Completed) => ("事后审计", "无审计结果".to_string()),
        },
    };
    format!("| {} {} | {} | {} |", result.firewall, name, verdict, note)
}

fn highlights(analyses: &PostAnalyses) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(c) = &analyses.contradictions {
        if c.consistent {
            out.push("- 各角色立场未见明显矛盾".to_string());
        } else {
            for pair in &c.contradictions {
                out.push(format!(
                    "- 立场矛盾：{} 持正面看法，{} 持负面看法",
                    pair.positive, pair.negative
                ));
            }
        }
    }
    if let Some(t) = &analyses.temporal
        && !t.fresh
    {
        let years: Vec<String> = t.stale_years.iter().map(|y| y.to_string()).collect();
        out.push(format!("- 时效提醒：引用了较旧年份的数据（{}）", years.join("、")));
    }
    if let Some(s) = &analyses.sources {
        out.push(format!(
            "- 来源：{} 个独立来源，独立性 {:.0}%，平均可信度 {:.2}",
            s.independent_hosts,
            s.independence_ratio * 100.0,
            s.mean_credibility
        ));
    }
    if let Some(c) = &analyses.constraints {
        if let (Some(limit), Some(need)) = (c.capital_limit_wan, c.required_capital_wan) {
            let verdict = if need <= limit { "在预算内" } else { "超出预算" };
            out.push(format!("- 资金约束：需要约 {need} 万，上限 {limit} 万，{verdict}"));
        }
        if let (Some(min), Some(roi)) = (c.min_roi_percent, c.estimated_roi_percent) {
            let verdict = if roi >= min { "达标" } else { "未达标" };
            out.push(format!("- 回报约束：预计 ROI {roi}%，要求 {min}%，{verdict}"));
        }
    }
    out
}

/// Terms from the glossary that occur in `text`, in glossary order.
pub fn glossary_terms(text: &str) -> Vec<(&'static str, &'static str)> {
    GLOSSARY
        .iter()
        .copied()
        .filter(|(term, _)| text.contains(term))
        .collect()
}

/// Compose the markdown report. Fails only when there is no analysis text.
pub fn compose_report(input: &ReportInput<'_>) -> Result<String, ReportError> {
    let aggregated = input.aggregated.trim();
    if aggregated.is_empty() {
        return Err(ReportError::NoContent);
    }

    let mut out = String::with_capacity(aggregated.len() + 1024);
    let project = if input.intent.project.is_empty() {
        "未指定"
    } else {
        input.intent.project.as_str()
    };
    let _ = writeln!(out, "# 分析报告\n");
    let _ = writeln!(out, "> 模式：{} · 项目：{}", mode_banner(input.mode), project);
    let _ = writeln!(out, "> 问题：{}\n", input.raw_input);
    let _ = writeln!(out, "## 分析结论\n\n{aggregated}\n");

    if !input.verification.is_empty() {
        let _ = writeln!(out, "## 验证摘要\n\n| 防火墙 | 结果 | 说明 |\n|---|---|---|");
        for result in input.verification {
            let _ = writeln!(out, "{}", verification_row(result));
        }
        out.push('\n');
    }

    let points = highlights(input.analyses);
    let chart = input.analyses.risk.as_ref().map(|r| r.chart.as_str());
    if !points.is_empty() || chart.is_some() {
        let _ = writeln!(out, "## 要点\n");
        for point in &points {
            let _ = writeln!(out, "{point}");
        }
        if let Some(chart) = chart {
            let _ = writeln!(out, "\n风险分布：\n\n```text\n{chart}\n```");
        }
        out.push('\n');
    }

    if input.explain_terms {
        let terms = glossary_terms(aggregated);
        if !terms.is_empty() {
            let _ = writeln!(out, "## 术语解释\n");
            for (term, meaning) in terms {
                let _ = writeln!(out, "- **{term}**：{meaning}");
            }
        }
    }

    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::FirewallId;
    use crate::types::Grade;

    fn input<'a>(
        aggregated: &'a str,
        intent: &'a Intent,
        verification: &'a [VerificationResult],
        analyses: &'a PostAnalyses,
        explain_terms: bool,
    ) -> ReportInput<'a> {
        ReportInput {
            mode: Mode::Reverse,
            intent,
            raw_input: "我有13万资金想做光伏项目",
            aggregated,
            verification,
            analyses,
            explain_terms,
        }
    }

    #[test]
    fn test_empty_content_is_error() {
        let intent = Intent::default();
        let analyses = PostAnalyses::default();
        let err = compose_report(&input("  ", &intent, &[], &analyses, true)).unwrap_err();
        assert!(matches!(err, ReportError::NoContent));
    }

    #[test]
    fn test_report_sections() {
        let intent = Intent {
            mode: Mode::Reverse,
            project: "屋顶光伏".into(),
        };
        let verification = vec![VerificationResult::new(
            FirewallId::Triangulation,
            false,
            VerificationPayload::Triangulation {
                verified: false,
                confidence: Grade::C,
                sources: vec![],
            },
        )];
        let analyses = PostAnalyses::default();
        let report = compose_report(&input(
            "## 财务分析师\n\n光伏并网后 ROI 约 12%",
            &intent,
            &verification,
            &analyses,
            true,
        ))
        .unwrap();

        assert!(report.starts_with("# 分析报告"));
        assert!(report.contains("逆向"));
        assert!(report.contains("项目：屋顶光伏"));
        assert!(report.contains("| 2 三角验证 | 未通过 | 未印证，置信度 C，来源 0 个 |"));
        assert!(report.contains("- **ROI**"));
        assert!(report.contains("- **并网**"));
        assert!(!report.contains("**IRR**"));
    }

    #[test]
    fn test_glossary_can_be_disabled() {
        let intent = Intent::default();
        let analyses = PostAnalyses::default();
        let report = compose_report(&input("ROI 很高", &intent, &[], &analyses, false)).unwrap();
        assert!(!report.contains("术语解释"));
    }
}
