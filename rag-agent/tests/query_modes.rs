mod common;

use std::sync::Arc;

use common::*;
use llm_interface::{BufferedSink, Role};
use rag_agent::{PostSearcher, TreeholeAgent};
use result_cache::{MemoryCacheStore, ResultCache};
use treehole_client::SortOrder;
use treehole_core::Post;

fn user_prompt(engine: &ScriptedEngine) -> String {
    let calls = engine.stream_calls();
    let messages = calls.last().unwrap();
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.content.clone())
        .unwrap()
}

/// A relevant post whose full comment list lives behind paging.
fn review_post() -> Post {
    let mut p = post(1, "计网 zhx 测评：给分不错");
    p.comment_total = 3;
    p.comments = vec![comment("计网 zhx 作业多", false)];
    p
}

fn review_comments() -> Vec<treehole_core::Comment> {
    vec![
        comment("计网 zhx 作业多", false),
        comment("同意", true),
        comment("zhx 人很好", true),
    ]
}

#[tokio::test]
async fn test_manual_search_without_results() {
    let forum = shared(FakeForum::new());
    let engine = shared(ScriptedEngine::new("unused"));
    let sink = shared(BufferedSink::new());

    let mut agent = TreeholeAgent::new(forum, engine.clone(), &test_config())
        .with_output_sink(sink.clone());
    let answer = agent.manual_search("  不存在的话题 ", "问题").await;

    assert_eq!(answer.answer, "抱歉，没有找到关于「不存在的话题」的相关树洞内容。");
    assert_eq!(sink.contents(), answer.answer);
    assert_eq!(answer.keyword.as_deref(), Some("不存在的话题"));
    assert!(answer.sources.is_empty());
    assert_eq!(answer.num_sources, 0);
    assert!(engine.stream_calls().is_empty());
}

#[tokio::test]
async fn test_manual_search_builds_context_and_streams() {
    let forum = shared(
        FakeForum::new().with_posts("计网", vec![post(1, "计网 很难"), post(2, "计网 还行")]),
    );
    let engine = shared(ScriptedEngine::new("综合来看中等难度"));
    let sink = shared(BufferedSink::new());

    let mut agent = TreeholeAgent::new(forum, engine.clone(), &test_config())
        .with_output_sink(sink.clone());
    let answer = agent.manual_search("计网", "难不难").await;

    assert_eq!(answer.answer, "综合来看中等难度");
    assert_eq!(sink.contents(), "综合来看中等难度");
    assert_eq!(answer.num_sources, 2);
    assert_eq!(
        answer.sources.iter().map(|s| s.post_id).collect::<Vec<_>>(),
        vec![1, 2]
    );

    let prompt = user_prompt(&engine);
    assert!(prompt.contains("=== 帖子 #1 ==="));
    assert!(prompt.contains("=== 帖子 #2 ==="));
    assert!(prompt.contains("用户问题：难不难"));
}

#[tokio::test]
async fn test_manual_search_respects_context_post_limit() {
    let posts = (1..=5).map(|i| post(i, "食堂")).collect();
    let forum = shared(FakeForum::new().with_posts("食堂", posts));
    let engine = shared(ScriptedEngine::new("ok"));
    let mut config = test_config();
    config.agent.max_context_posts = 2;

    let mut agent = TreeholeAgent::new(forum, engine, &config);
    let answer = agent.manual_search("食堂", "哪个好").await;

    assert_eq!(answer.num_sources, 2);
}

#[tokio::test]
async fn test_course_review_extracts_from_paged_comments() {
    let forum = shared(
        FakeForum::new()
            .with_posts("计网 zhx 测评", vec![review_post()])
            .with_comments(1, review_comments()),
    );
    let engine = shared(ScriptedEngine::new("分析结果"));

    let mut agent = TreeholeAgent::new(forum.clone(), engine.clone(), &test_config());
    let answer = agent.course_review("计网", "zhx").await;

    assert_eq!(forum.searches(), vec!["计网 zhx 测评"]);
    let requests = forum.comment_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].page_size, 10);
    assert_eq!(requests[0].sort_order, SortOrder::Asc);

    // post body, the matching reply, and the OP follow-up naming the instructor
    assert_eq!(answer.num_sources, 3);
    assert_eq!(answer.subject.as_deref(), Some("计网"));
    assert_eq!(answer.entities, vec!["zhx".to_string()]);
    assert!(answer.entity_stats.is_none());

    let prompt = user_prompt(&engine);
    assert!(prompt.contains("「计网」课程（zhx）"));
    assert!(prompt.contains("--- 评论 1 [洞主] (帖子#1) ---\n计网 zhx 测评：给分不错"));
    assert!(prompt.contains("计网 zhx 作业多"));
    assert!(prompt.contains("zhx 人很好"));
    assert!(!prompt.contains("同意"));
}

#[tokio::test]
async fn test_repeated_review_reuses_memo_and_matches() {
    let forum = shared(
        FakeForum::new()
            .with_posts("计网 zhx 测评", vec![review_post()])
            .with_comments(1, review_comments()),
    );
    let engine = shared(ScriptedEngine::new("ok"));

    let mut agent = TreeholeAgent::new(forum.clone(), engine.clone(), &test_config());
    let first = agent.course_review("计网", "zhx").await;
    let second = agent.course_review("计网", "zhx").await;

    assert_eq!(first, second);
    assert_eq!(forum.comment_requests().len(), 1);
    assert_eq!(agent.comment_store().memoized(1).map(<[_]>::len), Some(3));
}

#[tokio::test]
async fn test_course_review_without_posts() {
    let forum = shared(FakeForum::new());
    let engine = shared(ScriptedEngine::new("unused"));

    let mut agent = TreeholeAgent::new(forum.clone(), engine.clone(), &test_config());
    let answer = agent.course_review("计网", "").await;

    assert_eq!(forum.searches(), vec!["计网 测评"]);
    assert_eq!(
        answer.answer,
        "抱歉，没有找到关于「计网 未指定老师」课程的测评内容。"
    );
    assert!(answer.entities.is_empty());
    assert!(engine.stream_calls().is_empty());
}

#[tokio::test]
async fn test_course_review_posts_without_reviews() {
    let forum = shared(FakeForum::new().with_posts("计网 zhx 测评", vec![post(9, "无关内容")]));
    let engine = shared(ScriptedEngine::new("unused"));

    let mut agent = TreeholeAgent::new(forum, engine.clone(), &test_config());
    let answer = agent.course_review("计网", "zhx").await;

    assert_eq!(
        answer.answer,
        "找到了 1 个帖子，但没有发现包含「计网」的详细测评内容。"
    );
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].post_id, 9);
    assert!(engine.stream_calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_labels_collapse_to_single_review() {
    let forum = shared(
        FakeForum::new()
            .with_posts("计网 zhx 测评", vec![review_post()])
            .with_comments(1, review_comments()),
    );
    let engine = shared(ScriptedEngine::new("ok"));

    let mut agent = TreeholeAgent::new(forum.clone(), engine, &test_config());
    let answer = agent.course_review("计网", "zhx, zhx").await;

    assert_eq!(forum.searches(), vec!["计网 zhx 测评"]);
    assert_eq!(answer.entities, vec!["zhx".to_string()]);
    assert!(answer.entity_stats.is_none());
}

#[tokio::test]
async fn test_comparison_lists_entity_without_evidence() {
    let forum = shared(
        FakeForum::new()
            .with_posts("计网 zhx 测评", vec![review_post()])
            .with_comments(1, review_comments())
            .with_posts("计网 lmq 测评", vec![post(5, "计网 别的老师")]),
    );
    let engine = shared(ScriptedEngine::new("对比结论"));

    let mut agent = TreeholeAgent::new(forum.clone(), engine.clone(), &test_config());
    let answer = agent.course_review("计网", "zhx，lmq").await;

    assert_eq!(forum.searches(), vec!["计网 zhx 测评", "计网 lmq 测评"]);
    assert_eq!(answer.answer, "对比结论");
    assert_eq!(answer.entities, vec!["zhx".to_string(), "lmq".to_string()]);
    assert_eq!(answer.num_sources, 3);
    assert!(answer
        .sources
        .iter()
        .all(|s| s.entity_label.as_deref() == Some("zhx")));

    let stats = answer.entity_stats.unwrap();
    assert_eq!(stats[0].num_reviews, 3);
    assert_eq!(stats[1].entity_label, "lmq");
    assert_eq!(stats[1].num_posts, 1);
    assert_eq!(stats[1].num_reviews, 0);

    let prompt = user_prompt(&engine);
    assert!(prompt.contains("===== 老师：zhx ====="));
    assert!(!prompt.contains("===== 老师：lmq ====="));
    assert!(prompt.contains("没有提取到有效测评的老师：lmq"));
}

#[tokio::test]
async fn test_comparison_without_any_evidence_skips_engine() {
    let forum = shared(FakeForum::new().with_posts("计网 zhx 测评", vec![post(3, "无关")]));
    let engine = shared(ScriptedEngine::new("unused"));

    let mut agent = TreeholeAgent::new(forum, engine.clone(), &test_config());
    let answer = agent
        .compare_course("计网", &["zhx".to_string(), "lmq".to_string()])
        .await;

    assert_eq!(
        answer.answer,
        "抱歉，未能提取到「计网」不同老师的有效测评。检索情况：zhx: 1帖/0测评；lmq: 0帖/0测评"
    );
    assert_eq!(answer.num_sources, 0);
    assert_eq!(answer.entity_stats.map(|s| s.len()), Some(2));
    assert!(engine.stream_calls().is_empty());
    assert!(engine.decision_calls().is_empty());
}

#[tokio::test]
async fn test_cached_search_skips_forum() {
    let forum = shared(FakeForum::new().with_posts("树洞", vec![post(1, "树洞")]));
    let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 86400);
    let searcher = PostSearcher::new(forum.clone(), Some(cache));

    let first = searcher.search("树洞", 10).await;
    let second = searcher.search("树洞", 10).await;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.posts, second.posts);
    assert_eq!(forum.searches().len(), 1);
}

#[tokio::test]
async fn test_failed_search_is_not_cached() {
    let forum = shared(FakeForum::new().failing("坏词"));
    let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 86400);
    let searcher = PostSearcher::new(forum.clone(), Some(cache));

    let first = searcher.search("坏词", 10).await;
    let second = searcher.search("坏词", 10).await;

    assert!(first.posts.is_empty());
    assert_eq!(first.failure.as_deref(), Some("upstream refused"));
    assert!(!second.from_cache);
    assert_eq!(forum.searches().len(), 2);
}

#[tokio::test]
async fn test_transport_error_degrades_to_empty_and_is_not_cached() {
    let forum = shared(FakeForum::new().unreachable("超时"));
    let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), 86400);
    let searcher = PostSearcher::new(forum.clone(), Some(cache));

    let first = searcher.search("超时", 10).await;
    let second = searcher.search("超时", 10).await;

    assert!(first.posts.is_empty());
    assert!(first.failure.is_some());
    assert!(!second.from_cache);
    assert_eq!(forum.searches().len(), 2);
}

#[tokio::test]
async fn test_manual_search_after_transport_error() {
    let forum = shared(FakeForum::new().unreachable("计网"));
    let engine = shared(ScriptedEngine::new("unused"));

    let mut agent = TreeholeAgent::new(forum, engine.clone(), &test_config());
    let answer = agent.manual_search("计网", "难吗").await;

    assert_eq!(answer.answer, "抱歉，没有找到关于「计网」的相关树洞内容。");
    assert!(engine.stream_calls().is_empty());
}
