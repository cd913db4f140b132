//! Ruby Semantics Integration Tests
//!
//! Drives the public `Engine` end to end: object model, dispatch, closures,
//! exceptions and feature loading.

use std::fs;

use garnet_core::{CapturedOutput, Engine, EngineConfig, Error, ExceptionKind, Value};

/// Runs a program and returns what it printed.
fn run(source: &str) -> String {
    let output = CapturedOutput::new();
    let mut engine = Engine::new().with_output(output.clone());
    if let Err(error) = engine.eval(source) {
        panic!("{}\n--- raised ---\n{}", source, error);
    }
    output.contents()
}

/// Runs a program that must raise and returns the exception's kind and
/// message.
fn raise_of(source: &str) -> (ExceptionKind, String) {
    let mut engine = Engine::new().with_output(CapturedOutput::new());
    match engine.eval(source) {
        Ok(value) => panic!("expected {} to raise, got {:?}", source, value),
        Err(Error::Raised { exception, .. }) => (exception.kind, exception.message),
        Err(other) => panic!("expected an exception, got {}", other),
    }
}

// ============================================================================
// Object model
// ============================================================================

#[test]
fn test_ancestry_includes_mixins_between_class_and_superclass() {
    let source = r#"
module Greeting
end
module Farewell
end
class Foo < BasicObject
  include Kernel
end
class Bar
  include Greeting
  include Farewell
end
p Foo.ancestors
p Bar.ancestors
"#;
    assert_eq!(
        run(source),
        "[Foo, Kernel, BasicObject]\n[Bar, Greeting, Farewell, Object, Kernel, BasicObject]\n"
    );
}

#[test]
fn test_module_included_twice_appears_once() {
    let source = r#"
module M
end
class A
  include M
end
class B < A
  include M
end
p B.ancestors.count(M)
"#;
    assert_eq!(run(source), "1\n");
}

#[test]
fn test_own_methods_win_over_mixins() {
    let source = r#"
module Loud
  def speak
    "LOUD"
  end
  def volume
    11
  end
end
class Dog
  include Loud
  def speak
    "woof, " + super
  end
end
d = Dog.new
puts d.speak
puts d.volume
"#;
    assert_eq!(run(source), "woof, LOUD\n11\n");
}

#[test]
fn test_class_methods_live_on_the_eigenclass_and_inherit() {
    let source = r#"
class Shape
  def self.create(*args)
    new(*args)
  end
  class << self
    def kind
      name.downcase
    end
  end
end
class Circle < Shape
  def initialize(r)
    @r = r
  end
end
p Circle.create(2)
puts Circle.kind
p Shape.singleton_methods.sort
"#;
    assert_eq!(run(source), "#<Circle @r=2>\ncircle\n[:create, :kind]\n");
}

#[test]
fn test_singleton_method_only_affects_one_instance() {
    let source = r#"
class Foo
end
a = Foo.new
b = Foo.new
def a.greet
  "hello from a"
end
puts a.greet
puts a.class
p a.singleton_methods
begin
  b.greet
rescue NoMethodError => e
  puts e.message
end
"#;
    assert_eq!(run(source), "hello from a\nFoo\n[:greet]\nundefined method 'greet' for #<Foo>\n");
}

#[test]
fn test_reopening_classes_including_builtins() {
    let source = r#"
class Integer
  def double
    self * 2
  end
end
class String
  def shout
    upcase + "!"
  end
end
p 21.double
p "hi".shout
"#;
    assert_eq!(run(source), "42\n\"HI!\"\n");
}

#[test]
fn test_superclass_mismatch_is_rejected() {
    let (kind, message) = raise_of("class A\nend\nclass B\nend\nclass A < B\nend");
    assert_eq!(kind, ExceptionKind::TypeError);
    assert_eq!(message, "superclass mismatch for class A");
}

#[test]
fn test_class_new_and_const_assignment_names_the_class() {
    let source = r#"
Point = Class.new do
  attr_accessor :x
  def initialize(x)
    @x = x
  end
end
pt = Point.new(3)
pt.x += 1
p pt.x
p Point.name
"#;
    assert_eq!(run(source), "4\n\"Point\"\n");
}

// ============================================================================
// Dispatch and visibility
// ============================================================================

#[test]
fn test_private_method_needs_implicit_receiver() {
    let source = r#"
class Account
  def initialize(balance)
    @balance = balance
  end
  def report
    "balance: #{secret}"
  end
  private
  def secret
    @balance
  end
end
puts Account.new(5).report
"#;
    assert_eq!(run(source), "balance: 5\n");

    let (kind, message) = raise_of(&format!("{}Account.new(5).secret", source.replace("puts Account.new(5).report\n", "")));
    assert_eq!(kind, ExceptionKind::PrivateNoMethodError);
    assert_eq!(message, "private method 'secret' called for #<Account @balance=5>");
}

#[test]
fn test_private_errors_are_rescuable_as_name_errors() {
    let source = r#"
class Vault
  private def code
    42
  end
end
begin
  Vault.new.code
rescue NoMethodError
  puts "caught as NoMethodError"
rescue NameError => e
  p [e.class, e.is_a?(NoMethodError), e.is_a?(NameError)]
end
p PrivateNoMethodError.ancestors.include?(NoMethodError)
"#;
    assert_eq!(run(source), "[PrivateNoMethodError, false, true]\nfalse\n");
}

#[test]
fn test_protected_methods_between_instances_of_a_lineage() {
    let source = r#"
class Money
  def initialize(cents)
    @cents = cents
  end
  def >(other)
    cents > other.cents
  end
  protected
  def cents
    @cents
  end
end
class Euro < Money
end
p Money.new(5) > Euro.new(3)
begin
  Money.new(1).cents
rescue PrivateNoMethodError => e
  puts e.message
end
"#;
    assert_eq!(run(source), "true\nprotected method 'cents' called for #<Money @cents=1>\n");
}

#[test]
fn test_method_missing_and_respond_to() {
    let source = r#"
class Ghost
  def method_missing(name, *args)
    if name.to_s.start_with?("get_")
      "got #{name.to_s.split("_").last} #{args.inspect}"
    else
      super
    end
  end
  def respond_to_missing?(name, include_private = false)
    name.to_s.start_with?("get_") || super
  end
end
g = Ghost.new
puts g.get_name(1, 2)
p g.respond_to?(:get_anything)
p g.respond_to?(:other)
g.other
"#;
    let output = CapturedOutput::new();
    let mut engine = Engine::new().with_output(output.clone());
    let err = engine.eval(source).unwrap_err();
    assert_eq!(output.contents(), "got name [1, 2]\ntrue\nfalse\n");
    let exception = err.exception().unwrap();
    assert_eq!(exception.kind, ExceptionKind::NoMethodError);
    assert_eq!(exception.message, "undefined method 'other' for #<Ghost>");
}

#[test]
fn test_no_method_error_names_method_and_receiver() {
    let (kind, message) = raise_of("5.frobnicate");
    assert_eq!(kind, ExceptionKind::NoMethodError);
    assert_eq!(message, "undefined method 'frobnicate' for 5");

    let (kind, message) = raise_of("nil.upcase");
    assert_eq!(kind, ExceptionKind::NoMethodError);
    assert_eq!(message, "undefined method 'upcase' for nil");
}

#[test]
fn test_wrong_argument_count() {
    let (kind, message) = raise_of("def pair(a, b)\n  [a, b]\nend\npair(1)");
    assert_eq!(kind, ExceptionKind::ArgumentError);
    assert_eq!(message, "wrong number of arguments (given 1, expected 2)");

    let (_, message) = raise_of("def opt(a, b = 2)\nend\nopt(1, 2, 3)");
    assert_eq!(message, "wrong number of arguments (given 3, expected 1..2)");

    let (_, message) = raise_of("def rest(a, *b)\nend\nrest");
    assert_eq!(message, "wrong number of arguments (given 0, expected 1+)");
}

#[test]
fn test_send_and_public_send() {
    let source = r#"
class Box
  def open
    "opened"
  end
  private
  def lock
    "locked"
  end
end
b = Box.new
puts b.send(:open)
puts b.send(:lock)
puts b.public_send(:open)
"#;
    assert_eq!(run(source), "opened\nlocked\nopened\n");
    let (kind, _) = raise_of(&format!("{}b.public_send(:lock)", source));
    assert_eq!(kind, ExceptionKind::PrivateNoMethodError);
}

#[test]
fn test_super_forms() {
    let source = r#"
class Base
  def describe(a, b = 0)
    "base #{a} #{b}"
  end
end
class Child < Base
  def describe(a, b = 5)
    [super, super(a), super()].inspect
  rescue ArgumentError => e
    e.message
  end
end
puts Child.new.describe(1)
"#;
    assert_eq!(run(source), "wrong number of arguments (given 0, expected 1..2)\n");

    let source = r#"
class Base
  def describe(a, b = 0)
    "base #{a} #{b}"
  end
end
class Child < Base
  def describe(a, b = 5)
    [super, super(a)].inspect
  end
end
puts Child.new.describe(1)
"#;
    assert_eq!(run(source), "[\"base 1 0\", \"base 1 0\"]\n");
}

// ============================================================================
// Environments
// ============================================================================

#[test]
fn test_locals_do_not_leak_into_methods() {
    let source = r#"
x = 10
def peek
  x
end
peek
"#;
    let (kind, message) = raise_of(source);
    assert_eq!(kind, ExceptionKind::NameError);
    assert_eq!(message, "undefined local variable or method 'x' for main");
}

#[test]
fn test_block_locals_stay_in_the_block() {
    let source = r#"
total = 0
[1, 2].each do |n|
  inner = n
  total += inner
end
p total
p defined?(inner)
"#;
    assert_eq!(run(source), "3\nnil\n");
}

#[test]
fn test_globals_are_visible_everywhere() {
    let source = r#"
def bump
  $count = ($count || 0) + 1
end
bump
[1].each { bump }
p $count
"#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_instance_variables_and_constants_pass_through_blocks() {
    let source = r#"
class Counter
  STEP = 2
  def initialize
    @n = 0
  end
  def run
    3.times { @n += STEP }
    @n
  end
end
p Counter.new.run
"#;
    assert_eq!(run(source), "6\n");
}

// ============================================================================
// Integers
// ============================================================================

#[test]
fn test_integer_division() {
    assert_eq!(run("p 4 / 2\np(-7 / 2)\np(-7 % 3)"), "2\n-4\n2\n");
    let (kind, message) = raise_of("4 / 0");
    assert_eq!(kind, ExceptionKind::ZeroDivisionError);
    assert_eq!(message, "divided by 0");
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn test_proc_is_strict_block_is_lenient() {
    let (kind, message) = raise_of("pr = proc { |a, b| [a, b] }\npr.call(1)");
    assert_eq!(kind, ExceptionKind::ArgumentError);
    assert_eq!(message, "wrong number of arguments (given 1, expected 2)");

    let source = r#"
def pass_one
  yield 1
end
p(pass_one { |a, b| [a, b] })
"#;
    assert_eq!(run(source), "[1, nil]\n");
}

#[test]
fn test_closures_capture_their_scope() {
    let source = r#"
def make_counter
  count = 0
  increment = lambda { count += 1 }
  read = -> { count }
  [increment, read]
end
inc, read = make_counter
inc.call
inc.call
p read.call
"#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_return_from_block_leaves_the_method() {
    let source = r#"
def first_even(items)
  items.each do |n|
    return n if n.even?
  end
  :none
end
p first_even([1, 3, 4, 5])
p first_even([1])
"#;
    assert_eq!(run(source), "4\n:none\n");
}

#[test]
fn test_return_from_lambda_stays_in_the_lambda() {
    let source = r#"
def wrapper
  l = -> { return 1 }
  l.call + 1
end
p wrapper
"#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_break_and_next() {
    let source = r#"
r = [1, 2, 3, 4].each do |n|
  next if n.odd?
  break n * 100 if n == 4
end
p r
i = 0
while true
  i += 1
  break if i > 3
end
p i
"#;
    assert_eq!(run(source), "400\n4\n");
}

#[test]
fn test_yield_and_block_given() {
    let source = r#"
def maybe
  if block_given?
    yield(2, 3)
  else
    :no_block
  end
end
p maybe
p(maybe { |a, b| a * b })
"#;
    assert_eq!(run(source), ":no_block\n6\n");
}

#[test]
fn test_block_pass_and_symbol_to_proc() {
    let source = r#"
def apply(x, &fn)
  fn.call(x)
end
square = ->(n) { n * n }
p apply(7, &square)
p [:a, :b].map(&:to_s)
"#;
    assert_eq!(run(source), "49\n[\"a\", \"b\"]\n");
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_rescue_ensure_and_retry() {
    let source = r#"
attempts = 0
begin
  attempts += 1
  raise "flaky" if attempts < 3
  puts "succeeded after #{attempts}"
rescue
  retry
ensure
  puts "cleanup"
end
"#;
    assert_eq!(run(source), "succeeded after 3\ncleanup\n");
}

#[test]
fn test_exception_hierarchy_matching() {
    let source = r##"
class AppError < StandardError
end
class DbError < AppError
  def initialize(msg = "db down")
    super(msg)
  end
end
begin
  raise DbError
rescue ArgumentError
  puts "wrong"
rescue AppError => e
  puts "#{e.class}: #{e.message}"
  p e.is_a?(StandardError)
end
"##;
    assert_eq!(run(source), "DbError: db down\ntrue\n");
}

#[test]
fn test_uncaught_custom_exception_reaches_the_host() {
    let mut engine = Engine::new().with_output(CapturedOutput::new());
    let err = engine
        .eval("class Oops < RuntimeError\nend\ndef inner\n  raise Oops, \"bad\"\nend\ndef outer\n  inner\nend\nouter")
        .unwrap_err();
    let Error::Raised { exception, backtrace } = &err else {
        panic!("expected a raised error, got {:?}", err);
    };
    assert_eq!(exception.class_name, "Oops");
    assert_eq!(exception.kind, ExceptionKind::RuntimeError);
    assert!(exception.kind.is_a(ExceptionKind::StandardError));
    assert_eq!(err.to_string(), "bad (Oops)");
    assert!(backtrace[0].ends_with("in 'inner'"), "{:?}", backtrace);
    assert!(backtrace[1].ends_with("in 'outer'"), "{:?}", backtrace);
    assert!(backtrace.last().unwrap().ends_with("in '<main>'"), "{:?}", backtrace);
}

#[test]
fn test_method_level_rescue_and_else() {
    let source = r#"
def safe_div(a, b)
  a / b
rescue ZeroDivisionError => e
  "failed: #{e.message}"
else
  "never with a value"
end
p safe_div(1, 0)
"#;
    assert_eq!(run(source), "\"failed: divided by 0\"\n");
}

#[test]
fn test_stack_overflow_is_a_ruby_exception() {
    let config = EngineConfig {
        max_call_depth: 500,
        ..EngineConfig::default()
    };
    let output = CapturedOutput::new();
    let mut engine = Engine::with_config(config).with_output(output.clone());
    let source = r#"
def forever(n)
  forever(n + 1)
end
begin
  forever(0)
rescue SystemStackError => e
  puts e.message
end
"#;
    engine.eval(source).unwrap();
    assert_eq!(output.contents(), "stack level too deep\n");
}

// ============================================================================
// Enumerable, Comparable and collections
// ============================================================================

#[test]
fn test_user_collection_with_enumerable_and_comparable() {
    let source = r#"
class Card
  include Comparable
  attr_reader :rank
  def initialize(rank)
    @rank = rank
  end
  def <=>(other)
    rank <=> other.rank
  end
  def inspect
    "Card(#{rank})"
  end
end
class Hand
  include Enumerable
  def initialize(*cards)
    @cards = cards
  end
  def each(&block)
    @cards.each(&block)
    self
  end
end
hand = Hand.new(Card.new(9), Card.new(2), Card.new(5))
p hand.sort
p hand.max
p hand.select { |c| c > Card.new(4) }
p hand.map(&:rank).sum
p hand.sort_by { |c| c.rank }.last
"#;
    assert_eq!(
        run(source),
        "[Card(2), Card(5), Card(9)]\nCard(9)\n[Card(9), Card(5)]\n16\nCard(9)\n"
    );
}

#[test]
fn test_hash_and_array_programs() {
    let source = r##"
words = ["apple", "bob", "avocado", "cat"]
index = Hash.new { |h, k| h[k] = [] }
words.each { |w| index[w[0]] << w }
p index
p index.keys.sort
counts = words.map(&:length).tally
p counts
p words.each_with_index.map { |w, i| "#{i}:#{w}" }.join(",")
"##;
    assert_eq!(
        run(source),
        "{\"a\" => [\"apple\", \"avocado\"], \"b\" => [\"bob\"], \"c\" => [\"cat\"]}\n[\"a\", \"b\", \"c\"]\n{5 => 1, 3 => 2, 7 => 1}\n\"0:apple,1:bob,2:avocado,3:cat\"\n"
    );
}

// ============================================================================
// Feature loading
// ============================================================================

#[test]
fn test_require_loads_each_file_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("helper.rb"), "puts \"loading helper\"\ndef helper\n  :helped\nend\n").unwrap();

    let config = EngineConfig {
        load_paths: vec![dir.path().to_path_buf()],
        ..EngineConfig::default()
    };
    let output = CapturedOutput::new();
    let mut engine = Engine::with_config(config).with_output(output.clone());
    let value = engine.eval("a = require \"helper\"\nb = require \"helper\"\n[a, b, helper]").unwrap();
    assert_eq!(engine.inspect(&value), "[true, false, :helped]");
    assert_eq!(output.contents(), "loading helper\n");
}

#[test]
fn test_require_relative_and_missing_features() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lib.rb"), "VALUE = 42\n").unwrap();
    let main = dir.path().join("main.rb");
    fs::write(&main, "require_relative \"lib\"\nVALUE\n").unwrap();

    let mut engine = Engine::new().with_output(CapturedOutput::new());
    let value = engine.eval_file(&main).unwrap();
    assert!(matches!(value, Value::Integer(42)));

    let (kind, message) = raise_of("require \"no_such_feature\"");
    assert_eq!(kind, ExceptionKind::LoadError);
    assert_eq!(message, "cannot load such file -- no_such_feature");
}

#[test]
fn test_eval_file_missing_is_io_error() {
    let mut engine = Engine::new();
    let err = engine.eval_file(std::path::Path::new("/definitely/not/here.rb")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
