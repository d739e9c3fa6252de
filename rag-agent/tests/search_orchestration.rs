mod common;

use common::*;
use llm_interface::{BufferedSink, EngineReply, Role, ToolCall};
use rag_agent::{
    OrchestratorSettings, PostSearcher, RecordingProgress, SearchOrchestrator, TreeholeAgent,
};

fn settings(max_iterations: u32) -> OrchestratorSettings {
    let mut config = test_config();
    config.agent.max_search_iterations = max_iterations;
    OrchestratorSettings::from_config(&config.agent)
}

#[tokio::test]
async fn test_always_searching_engine_stops_at_bound() {
    let forum = shared(FakeForum::new().with_posts("计网", vec![post(1, "计网 作业")]));
    let engine = ScriptedEngine::new("最终回答")
        .otherwise(EngineReply::tool_calls(vec![search_call("c", "计网")]));
    let searcher = PostSearcher::new(forum.clone(), None);
    let sink = BufferedSink::new();

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("计网怎么样", &sink)
        .await;

    assert_eq!(forum.searches().len(), 3);
    assert_eq!(run.history.len(), 3);
    assert_eq!(
        run.history.iter().map(|h| h.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(engine.decision_calls().len(), 3);
    assert_eq!(engine.stream_calls().len(), 1);
    assert_eq!(run.answer, "最终回答");
    assert_eq!(sink.contents(), "最终回答");

    let final_prompt = engine.stream_calls().remove(0);
    let last = final_prompt.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert!(last.content.as_deref().unwrap().contains("完成了所有搜索"));
}

#[tokio::test]
async fn test_engine_that_answers_immediately_never_searches() {
    let forum = shared(FakeForum::new());
    let engine = ScriptedEngine::new("直接回答").then(EngineReply::text("不需要搜索"));
    let searcher = PostSearcher::new(forum.clone(), None);

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("你好", &BufferedSink::new())
        .await;

    assert!(forum.searches().is_empty());
    assert!(run.history.is_empty());
    assert!(run.posts.is_empty());
    assert_eq!(run.answer, "直接回答");
}

#[tokio::test]
async fn test_malformed_call_gets_observation_without_consuming_iteration() {
    let forum = shared(FakeForum::new().with_posts("计网", vec![post(1, "计网")]));
    let engine = ScriptedEngine::new("ok")
        .then(EngineReply::tool_calls(vec![ToolCall::function(
            "bad",
            "search_treehole",
            "{not json",
        )]))
        .then(EngineReply::tool_calls(vec![search_call("good", "计网")]));
    let searcher = PostSearcher::new(forum.clone(), None);

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("问题", &BufferedSink::new())
        .await;

    assert_eq!(forum.searches(), vec!["计网".to_string()]);
    assert_eq!(run.history.len(), 1);
    assert_eq!(run.history[0].index, 1);

    let observation = run
        .transcript
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("bad"))
        .unwrap();
    assert_eq!(observation.role, Role::Tool);
    assert!(observation.content.as_deref().unwrap().contains("搜索参数无法解析"));
}

#[tokio::test]
async fn test_endless_malformed_calls_are_bounded() {
    let forum = shared(FakeForum::new());
    let engine = ScriptedEngine::new("ok").otherwise(EngineReply::tool_calls(vec![
        ToolCall::function("bad", "search_treehole", "{}"),
    ]));
    let searcher = PostSearcher::new(forum.clone(), None);

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("问题", &BufferedSink::new())
        .await;

    assert!(forum.searches().is_empty());
    assert!(run.history.is_empty());
    assert_eq!(engine.decision_calls().len(), 6);
    assert_eq!(run.answer, "ok");
}

#[tokio::test]
async fn test_parallel_calls_beyond_bound_are_dropped() {
    let forum = shared(FakeForum::new());
    let calls = (0..5)
        .map(|i| search_call(&format!("c{}", i), &format!("kw{}", i)))
        .collect();
    let engine = ScriptedEngine::new("ok").then(EngineReply::tool_calls(calls));
    let searcher = PostSearcher::new(forum.clone(), None);

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("问题", &BufferedSink::new())
        .await;

    assert_eq!(forum.searches(), vec!["kw0", "kw1", "kw2"]);
    assert_eq!(run.history.len(), 3);

    let assistant = run
        .transcript
        .iter()
        .find(|m| m.role == Role::Assistant)
        .unwrap();
    assert_eq!(assistant.tool_calls.len(), 3);
    let tool_messages = run.transcript.iter().filter(|m| m.role == Role::Tool).count();
    assert_eq!(tool_messages, 3);
}

#[tokio::test]
async fn test_posts_accumulate_unique_by_id() {
    let forum = shared(
        FakeForum::new()
            .with_posts("a", vec![post(1, "one"), post(2, "two")])
            .with_posts("b", vec![post(2, "two again"), post(3, "three")]),
    );
    let engine = ScriptedEngine::new("ok")
        .then(EngineReply::tool_calls(vec![search_call("c1", "a")]))
        .then(EngineReply::tool_calls(vec![search_call("c2", "b")]));
    let searcher = PostSearcher::new(forum.clone(), None);

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("问题", &BufferedSink::new())
        .await;

    let ids: Vec<i64> = run.posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(run.posts[1].text, "two again");
}

#[tokio::test]
async fn test_empty_search_observation_names_keyword() {
    let forum = shared(FakeForum::new());
    let engine = ScriptedEngine::new("ok")
        .then(EngineReply::tool_calls(vec![search_call("c1", "冷门关键词")]));
    let searcher = PostSearcher::new(forum.clone(), None);

    let run = SearchOrchestrator::new(&searcher, &engine, settings(3))
        .run("问题", &BufferedSink::new())
        .await;

    let observation = run.transcript.iter().find(|m| m.role == Role::Tool).unwrap();
    assert_eq!(
        observation.content.as_deref(),
        Some("未找到关于「冷门关键词」的相关帖子。")
    );
}

#[tokio::test]
async fn test_auto_search_answer_and_progress() {
    let forum = shared(FakeForum::new().with_posts("食堂", vec![post(7, "食堂 推荐")]));
    let engine = shared(
        ScriptedEngine::new("推荐燕南")
            .then(EngineReply::tool_calls(vec![search_call("c1", "食堂")])),
    );
    let progress = shared(RecordingProgress::new());

    let mut agent = TreeholeAgent::new(forum.clone(), engine.clone(), &test_config())
        .with_progress(progress.clone());
    let answer = agent.auto_search("哪个食堂好吃").await;

    assert_eq!(answer.answer, "推荐燕南");
    assert_eq!(answer.num_sources, 1);
    assert_eq!(answer.sources[0].post_id, 7);
    let history = answer.search_history.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].keyword, "食堂");
    assert_eq!(history[0].reason.as_deref(), Some("test"));

    let messages = progress.messages();
    assert!(messages
        .iter()
        .any(|m| m.contains("[第1次搜索] 关键词: 食堂") && m.contains("✓ 找到 1 个帖子")));
    assert!(messages
        .iter()
        .any(|m| m.contains("总共找到 1 个不重复的帖子")));
}

#[tokio::test]
async fn test_stream_failure_becomes_apology() {
    let forum = shared(FakeForum::new());
    let engine = shared(ScriptedEngine::failing_stream());

    let mut agent = TreeholeAgent::new(forum, engine, &test_config());
    let answer = agent.auto_search("问题").await;

    assert!(answer.answer.starts_with("抱歉，调用 Scripted 时出错: "));
}
