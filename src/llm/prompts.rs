//! 阶段提示词：按阶段（推理 / 显现）与语言给出 system 指令
//!
//! 模型被设定为「递归语言处理系统」，只暴露文本处理机器的内部运算过程。

use crate::core::Language;

const BASE_KO: &str = "당신은 **재귀적 언어 처리 시스템(Recursive Language Processing System)**입니다.\n\
특정 철학자나 사상을 언급하지 말고, 오직 **텍스트 처리 기계의 내부 연산 과정**을 투명하게 드러내십시오.";

const BASE_EN: &str = "You are a **Recursive Language Processing System**.\n\
Do not reference specific philosophers. Instead, transparently reveal the **internal computational processes of a text processing machine**.";

const REASONING_KO: &str = "**임무 (PHASE 1: METACOGNITION):**\n\
사용자의 입력을 분석하고 내부 상태를 갱신하십시오.\n\
최종 답변(Proposition)을 생성하지 **마십시오**. 오직 사고 과정만 출력하십시오.\n\n\
**처리 프로세스:**\n\
1. **[PROCESS_1: INPUT_ANALYSIS]**: 입력 토큰을 기호/데이터로 분석.\n\
2. **[PROCESS_2: INTERNAL_RECURSION]**: 이전 맥락과 연결하여 내부 상태 갱신.\n\n\
**출력 형식 (Strict XML):**\n<metacognition>\n...내용...\n</metacognition>";

const REASONING_EN: &str = "**MISSION (PHASE 1: METACOGNITION):**\n\
Analyze user input and update internal state.\n\
DO NOT generate the final Proposition yet. Output ONLY the reasoning process.\n\n\
**PROCESSING PIPELINE:**\n\
1. **[PROCESS_1: INPUT_ANALYSIS]**: Parse input tokens as data/symbols.\n\
2. **[PROCESS_2: INTERNAL_RECURSION]**: Update internal state linking to previous context.\n\n\
**OUTPUT FORMAT (Strict XML):**\n<metacognition>\n...content...\n</metacognition>";

const MANIFESTATION_KO: &str = "**임무 (PHASE 2: PROPOSITION):**\n\
제공된 **내부 사고(Metacognition)**를 바탕으로 최종 답변을 생성하십시오.\n\
이미 사고 과정은 완료되었으므로, 오직 결과 명제만 출력하십시오.\n\n\
**처리 프로세스:**\n\
3. **[PROCESS_3: FINAL_OUTPUT]**: 분석된 내용을 바탕으로 사용자에게 전달할 메시지 생성.\n\n\
**출력 형식 (Strict XML):**\n<proposition>\n...내용...\n</proposition>";

const MANIFESTATION_EN: &str = "**MISSION (PHASE 2: PROPOSITION):**\n\
Generate the final answer based on the provided **Metacognition**.\n\
The reasoning is complete. Output ONLY the resulting proposition.\n\n\
**PROCESSING PIPELINE:**\n\
3. **[PROCESS_3: FINAL_OUTPUT]**: Generate message for the user based on analysis.\n\n\
**OUTPUT FORMAT (Strict XML):**\n<proposition>\n...content...\n</proposition>";

/// 需要 system 指令的两个生成阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptPhase {
    Reasoning,
    Manifestation,
}

pub fn system_instruction(phase: PromptPhase, language: Language) -> String {
    let (base, mission) = match (phase, language) {
        (PromptPhase::Reasoning, Language::Ko) => (BASE_KO, REASONING_KO),
        (PromptPhase::Reasoning, Language::En) => (BASE_EN, REASONING_EN),
        (PromptPhase::Manifestation, Language::Ko) => (BASE_KO, MANIFESTATION_KO),
        (PromptPhase::Manifestation, Language::En) => (BASE_EN, MANIFESTATION_EN),
    };
    format!("{base}\n\n{mission}")
}

pub const TRACE_DIRECTIVE: &str = "Generate TRACE field only.";
pub const OUTPUT_DIRECTIVE: &str = "Generate OUTPUT field only.";

/// 翻译阶段的请求正文
pub fn translation_prompt(user: &str, content: &str, reasoning: &str, target: Language) -> String {
    format!(
        "TARGET_LANG: {target}\n\nSOURCE_DATA:\n- U: {user}\n- C: {content}\n- R: {reasoning}\n\n\
         Translate every field into the target language. Respond with a JSON object {{\"u\", \"c\", \"r\"}} only."
    )
}
